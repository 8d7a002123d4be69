//! Stripe PaymentIntents over the REST API

use super::{GatewayError, Intent, IntentRequest, IntentStatus, PaymentGateway};
use crate::config::PaymentsConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    last_payment_error: Option<StripeError>,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeError,
}

impl StripeIntent {
    fn into_intent(self) -> Intent {
        let reason = self
            .last_payment_error
            .map(|e| e.message.or(e.code).unwrap_or_else(|| "payment failed".to_string()));
        Intent {
            status: IntentStatus::from_stripe(&self.status, reason.as_deref()),
            id: self.id,
            client_secret: self.client_secret,
        }
    }
}

/// Stripe-backed [`PaymentGateway`]
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PaymentsConfig) -> Result<Self, GatewayError> {
        let key = config
            .stripe_secret_key
            .clone()
            .ok_or_else(|| GatewayError::Transport("stripe_secret_key is not configured".into()))?;
        Self::new(key, config.stripe_api_base.clone())
    }

    async fn decode(response: reqwest::Response) -> Result<Intent, GatewayError> {
        let status = response.status();
        if status.is_success() {
            let intent: StripeIntent = response
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            return Ok(intent.into_intent());
        }

        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => body.error.message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<Intent, GatewayError> {
        let months: Vec<String> = request.months.iter().map(|m| m.to_string()).collect();
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[payment_id]", request.payment_id.to_string()),
            ("metadata[rental_id]", request.rental_id.to_string()),
            ("metadata[months]", months.join(",")),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", request.payment_id.to_string())
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Self::decode(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<Intent, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(intent_id.to_string()));
        }
        Self::decode(response).await
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<Intent, GatewayError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/payment_intents/{}/cancel",
                self.api_base, intent_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("cancellation_reason", "abandoned")])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(intent_id.to_string()));
        }
        Self::decode(response).await
    }
}
