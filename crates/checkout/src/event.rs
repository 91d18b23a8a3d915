//! Payment notification payloads.

use std::collections::BTreeMap;

use common::CartId;
use domain::{Money, ShippingAddress};
use serde::Deserialize;

use crate::error::{CheckoutError, Result};

/// The only event kind that triggers fulfillment.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    client_reference_id: Option<String>,
    customer_email: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// An authenticated payment notification.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Provider event id; the idempotency key.
    pub id: String,
    /// Event kind, e.g. `checkout.session.completed`.
    pub kind: String,
    object: serde_json::Value,
}

/// The fields of a completed checkout session that fulfillment needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSession {
    pub session_id: String,
    pub cart_id: CartId,
    pub customer_email: Option<String>,
    /// What the provider actually settled, in minor units.
    pub amount_total: Money,
    pub currency: Option<String>,
    pub shipping_address: ShippingAddress,
}

impl PaymentEvent {
    /// Parses the envelope of a notification body.
    ///
    /// Only the envelope is checked here; the session object is decoded by
    /// [`PaymentEvent::completed_session`] once the kind is known to matter.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| CheckoutError::MalformedPayload(format!("event envelope: {e}")))?;

        if raw.id.is_empty() {
            return Err(CheckoutError::MalformedPayload("event id is empty".into()));
        }

        Ok(Self {
            id: raw.id,
            kind: raw.kind,
            object: raw.data.object,
        })
    }

    /// Returns true if this event should be fulfilled.
    pub fn is_checkout_completed(&self) -> bool {
        self.kind == CHECKOUT_SESSION_COMPLETED
    }

    /// Decodes the checkout session carried by this event.
    pub fn completed_session(&self) -> Result<CompletedSession> {
        let raw: RawSession = serde_json::from_value(self.object.clone())
            .map_err(|e| CheckoutError::MalformedPayload(format!("session object: {e}")))?;

        let reference = raw.client_reference_id.ok_or_else(|| {
            CheckoutError::MalformedPayload("session has no client_reference_id".into())
        })?;
        let cart_id = CartId::parse(&reference).map_err(|e| {
            CheckoutError::MalformedPayload(format!("client_reference_id '{reference}': {e}"))
        })?;
        let amount_total = raw
            .amount_total
            .map(Money::from_cents)
            .ok_or_else(|| CheckoutError::MalformedPayload("session has no amount_total".into()))?;

        Ok(CompletedSession {
            session_id: raw.id,
            cart_id,
            customer_email: raw.customer_email,
            amount_total,
            currency: raw.currency,
            shipping_address: ShippingAddress::from_metadata(&raw.metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed_body(cart_id: CartId) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "client_reference_id": cart_id.to_string(),
                    "customer_email": "buyer@example.com",
                    "amount_total": 2500,
                    "currency": "egp",
                    "metadata": {
                        "details": "12 Nile St",
                        "city": "Cairo",
                        "phone": "0100000000",
                        "cart_id": cart_id.to_string()
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_completed_session() {
        let cart_id = CartId::new();
        let event = PaymentEvent::parse(&completed_body(cart_id)).unwrap();

        assert_eq!(event.id, "evt_123");
        assert!(event.is_checkout_completed());

        let session = event.completed_session().unwrap();
        assert_eq!(session.session_id, "cs_test_abc");
        assert_eq!(session.cart_id, cart_id);
        assert_eq!(session.amount_total, Money::from_cents(2500));
        assert_eq!(session.customer_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(session.shipping_address.city, "Cairo");
        assert_eq!(session.shipping_address.postal_code, None);
    }

    #[test]
    fn test_other_kinds_parse_but_are_not_completed() {
        let body = json!({
            "id": "evt_2",
            "type": "payment_intent.created",
            "data": { "object": { "id": "pi_1" } }
        });
        let event = PaymentEvent::parse(body.to_string().as_bytes()).unwrap();
        assert!(!event.is_checkout_completed());
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            PaymentEvent::parse(b"not json"),
            Err(CheckoutError::MalformedPayload(_))
        ));

        let no_reference = json!({
            "id": "evt_3",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "amount_total": 100 } }
        });
        let event = PaymentEvent::parse(no_reference.to_string().as_bytes()).unwrap();
        assert!(matches!(
            event.completed_session(),
            Err(CheckoutError::MalformedPayload(_))
        ));

        let bad_reference = json!({
            "id": "evt_4",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1", "client_reference_id": "not-a-uuid", "amount_total": 100
            } }
        });
        let event = PaymentEvent::parse(bad_reference.to_string().as_bytes()).unwrap();
        assert!(matches!(
            event.completed_session(),
            Err(CheckoutError::MalformedPayload(_))
        ));
    }
}
