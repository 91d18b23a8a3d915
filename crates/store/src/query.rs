use common::UserId;
use domain::Order;

/// Filter for listing orders.
///
/// Orders are always returned newest first (highest number first).
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Only orders placed by this user.
    pub owner: Option<UserId>,

    /// Only paid (`true`) or unpaid (`false`) orders.
    pub is_paid: Option<bool>,

    /// Only delivered (`true`) or undelivered (`false`) orders.
    pub is_delivered: Option<bool>,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's orders.
    pub fn for_owner(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Default::default()
        }
    }

    /// Filters by payment status.
    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    /// Filters by delivery status.
    pub fn delivered(mut self, is_delivered: bool) -> Self {
        self.is_delivered = Some(is_delivered);
        self
    }

    /// Returns true if `order` passes every filter.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(owner) = self.owner
            && order.owner() != owner
        {
            return false;
        }
        if let Some(is_paid) = self.is_paid
            && order.is_paid() != is_paid
        {
            return false;
        }
        if let Some(is_delivered) = self.is_delivered
            && order.is_delivered() != is_delivered
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderId;
    use domain::{Cart, LineItem, Money, OrderDraft, ShippingAddress};

    fn order_for(owner: UserId) -> Order {
        let cart = Cart::new(owner).with_item(LineItem::new("p", 1, Money::from_cents(100)));
        Order::from_cart(
            OrderId::new(),
            1,
            &cart,
            &OrderDraft::cash(ShippingAddress::default()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn query_for_owner() {
        let owner = UserId::new();
        let query = OrderQuery::for_owner(owner);

        assert!(query.matches(&order_for(owner)));
        assert!(!query.matches(&order_for(UserId::new())));
    }

    #[test]
    fn query_builder_chain() {
        let owner = UserId::new();
        let query = OrderQuery::for_owner(owner).paid(false).delivered(false);

        assert_eq!(query.owner, Some(owner));
        assert_eq!(query.is_paid, Some(false));
        assert!(query.matches(&order_for(owner)));
        assert!(!OrderQuery::new().paid(true).matches(&order_for(owner)));
    }
}
