//! Payment provider seam
//!
//! Checkouts create a provider payment intent; the outcome arrives later,
//! either by webhook or by polling [`PaymentGateway::retrieve_intent`].

pub mod mock;
pub mod stripe;
pub mod webhook;

pub use mock::MockGateway;
pub use stripe::StripeGateway;
pub use webhook::{WebhookEvent, WebhookVerifier, parse_event};

use crate::core::month::YearMonth;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Errors returned by a payment provider
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider request failed: {0}")]
    Transport(String),

    #[error("payment provider rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("payment intent {0} not found")]
    NotFound(String),

    #[error("unexpected payment provider response: {0}")]
    Decode(String),
}

/// What the provider reports about an intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntentStatus {
    /// Charge submitted, result pending
    Processing,
    /// Waiting on the payer (card details, 3-D Secure, confirmation)
    RequiresAction,
    Succeeded,
    Failed { reason: String },
    Canceled,
}

impl IntentStatus {
    /// Map a Stripe `PaymentIntent.status`
    ///
    /// `requires_payment_method` means "waiting for a card" on a fresh intent
    /// and "the last attempt failed" once `last_payment_error` is set.
    pub fn from_stripe(status: &str, last_error: Option<&str>) -> Self {
        match (status, last_error) {
            ("succeeded", _) => IntentStatus::Succeeded,
            ("processing", _) => IntentStatus::Processing,
            ("canceled", _) => IntentStatus::Canceled,
            ("requires_payment_method", Some(reason)) => IntentStatus::Failed {
                reason: reason.to_string(),
            },
            _ => IntentStatus::RequiresAction,
        }
    }
}

/// Request to open an intent for a local payment
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub payment_id: Uuid,
    pub rental_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub months: Vec<YearMonth>,
}

/// Provider-side payment intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Open an intent; must be idempotent per `payment_id`
    async fn create_intent(&self, request: &IntentRequest) -> Result<Intent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<Intent, GatewayError>;

    /// Cancel an intent the payer never completed
    async fn cancel_intent(&self, intent_id: &str) -> Result<Intent, GatewayError>;
}
