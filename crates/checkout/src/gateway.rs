//! Payment provider session creation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CartId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Everything the provider needs to open a hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Round-trips back in the completion event as `client_reference_id`.
    pub cart_id: CartId,
    pub amount: Money,
    pub currency: String,
    pub customer_email: String,
    /// Label shown on the payment page.
    pub description: String,
    /// Shipping address entries plus `cart_id`.
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// The opaque session descriptor returned to the shopper for redirection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Trait for payment providers that host checkout pages.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session. Has no effect on local state.
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession>;
}

/// Stripe Checkout over the REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    /// Creates a gateway against `api_base` (normally `https://api.stripe.com`).
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn form_fields(request: &SessionRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount.cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), request.cart_id.to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];
        fields.extend(
            request
                .metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
        );
        fields
    }
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, request), fields(cart_id = %request.cart_id))]
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&Self::form_fields(request))
            .send()
            .await
            .map_err(|e| CheckoutError::Gateway(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CheckoutError::Gateway(e.to_string()))?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown provider error");
            tracing::warn!(%status, error_message = message, "Provider rejected checkout session");
            return Err(CheckoutError::Gateway(format!("{status}: {message}")));
        }

        serde_json::from_value(body)
            .map_err(|e| CheckoutError::Gateway(format!("unexpected session response: {e}")))
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    requests: Vec<SessionRequest>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory payment gateway for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_on_create = fail;
        }
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.state
            .read()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        let mut state = self
            .state
            .write()
            .map_err(|_| CheckoutError::Gateway("gateway state poisoned".into()))?;

        if state.fail_on_create {
            return Err(CheckoutError::Gateway("Provider unavailable".to_string()));
        }

        state.next_id += 1;
        let id = format!("cs_test_{:04}", state.next_id);
        state.requests.push(request.clone());

        Ok(CheckoutSession {
            url: format!("https://checkout.example.test/pay/{id}"),
            id,
        })
    }
}
