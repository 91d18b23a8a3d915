//! Checkout state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Where a cart is on its way to becoming an order.
///
/// State transitions:
/// ```text
/// Initiated ──► Paid ──► Fulfilled
///     │           │
///     └───────────┴──► Abandoned
/// ```
///
/// `Abandoned` covers both carts that never got paid and payments whose cart
/// could not be resolved; neither has side effects on orders or stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    /// A cart exists and no order has been materialized from it.
    #[default]
    Initiated,

    /// An authenticated payment notification has claimed the cart.
    Paid,

    /// The order exists, stock is adjusted and the cart is gone (terminal).
    Fulfilled,

    /// Neither a cart nor an order exists (terminal).
    Abandoned,
}

impl CheckoutState {
    /// Returns true if `next` is reachable in one step.
    pub fn can_transition_to(&self, next: CheckoutState) -> bool {
        matches!(
            (self, next),
            (CheckoutState::Initiated, CheckoutState::Paid)
                | (CheckoutState::Initiated, CheckoutState::Fulfilled)
                | (CheckoutState::Initiated, CheckoutState::Abandoned)
                | (CheckoutState::Paid, CheckoutState::Fulfilled)
                | (CheckoutState::Paid, CheckoutState::Abandoned)
        )
    }

    /// Moves to `next`, rejecting unconnected transitions.
    pub fn transition(self, next: CheckoutState) -> Result<CheckoutState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Fulfilled | CheckoutState::Abandoned)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Initiated => "Initiated",
            CheckoutState::Paid => "Paid",
            CheckoutState::Fulfilled => "Fulfilled",
            CheckoutState::Abandoned => "Abandoned",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
