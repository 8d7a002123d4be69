//! In-process gateway for development and tests

use super::{GatewayError, Intent, IntentRequest, IntentStatus, PaymentGateway};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct MockState {
    intents: HashMap<String, Intent>,
    /// payment id -> intent id, so repeated creates return the same intent
    by_payment: HashMap<Uuid, String>,
    fail_next_create: Option<String>,
}

/// Gateway that keeps intents in memory
///
/// New intents start in `RequiresAction`; tests drive them with
/// [`MockGateway::set_status`].
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change what the provider reports for `intent_id`
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) -> anyhow::Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| anyhow!("unknown intent {}", intent_id))?;
        intent.status = status;
        Ok(())
    }

    /// Make the next `create_intent` call fail with `message`
    pub fn fail_next_create(&self, message: impl Into<String>) -> anyhow::Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        state.fail_next_create = Some(message.into());
        Ok(())
    }

    pub fn intent_count(&self) -> usize {
        self.state.read().map(|s| s.intents.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<Intent, GatewayError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| GatewayError::Transport(format!("Failed to acquire write lock: {}", e)))?;

        if let Some(message) = state.fail_next_create.take() {
            return Err(GatewayError::Api {
                status: 402,
                message,
            });
        }

        if let Some(existing) = state
            .by_payment
            .get(&request.payment_id)
            .and_then(|id| state.intents.get(id))
        {
            return Ok(existing.clone());
        }

        let id = format!("pi_mock_{}", Uuid::new_v4().simple());
        let intent = Intent {
            client_secret: Some(format!("{}_secret_mock", id)),
            id: id.clone(),
            status: IntentStatus::RequiresAction,
        };
        state.by_payment.insert(request.payment_id, id.clone());
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<Intent, GatewayError> {
        let state = self
            .state
            .read()
            .map_err(|e| GatewayError::Transport(format!("Failed to acquire read lock: {}", e)))?;
        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(intent_id.to_string()))
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<Intent, GatewayError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| GatewayError::Transport(format!("Failed to acquire write lock: {}", e)))?;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::NotFound(intent_id.to_string()))?;
        if intent.status == IntentStatus::Succeeded {
            return Err(GatewayError::Api {
                status: 400,
                message: "payment intent has already succeeded".to_string(),
            });
        }
        intent.status = IntentStatus::Canceled;
        Ok(intent.clone())
    }
}
