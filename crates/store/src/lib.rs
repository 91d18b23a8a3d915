pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use ledger::{
    AnomalyKind, AnomalyRecord, EventOutcome, Materialization, MaterializeRequest, PaymentEventRef,
    ProcessedEvent, StatusChange,
};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{CartStore, CheckoutStore, EventLedger, InventoryLedger, OrderStore};
