//! Stripe webhook authentication and event decoding
//!
//! Stripe signs `"{timestamp}.{body}"` with HMAC-SHA256 and sends the result
//! in the `Stripe-Signature` header as `t=<unix>,v1=<hex>[,v1=<hex>...]`.

use super::IntentStatus;
use crate::core::error::WebhookError;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies webhook signatures against a shared endpoint secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Check `header` against `payload` as of `now` (unix seconds)
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(WebhookError::MalformedSignature {
                    message: format!("unexpected element '{}'", part),
                });
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::MalformedSignature {
                            message: format!("invalid timestamp '{}'", value),
                        }
                    })?)
                }
                // Non-hex v1 values cannot match; skip them
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| WebhookError::MalformedSignature {
            message: "missing timestamp".to_string(),
        })?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedSignature {
                message: "no v1 signature".to_string(),
            });
        }

        let age_secs = now - timestamp;
        if age_secs.abs() > self.tolerance_secs {
            return Err(WebhookError::TimestampOutOfTolerance { age_secs });
        }

        let matched = signatures.iter().any(|sig| {
            self.mac(timestamp, payload).verify_slice(sig).is_ok()
        });
        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    /// Produce a header Stripe would send for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = hex::encode(self.mac(timestamp, payload).finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

/// A decoded webhook that concerns a payment intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Provider event id, used for de-duplication
    pub id: String,
    pub kind: String,
    /// `None` for event types the ledger does not act on
    pub intent_id: Option<String>,
    pub outcome: Option<IntentStatus>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Decode a verified webhook body
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload {
            message: e.to_string(),
        })?;

    let is_intent = raw.data.object.object.as_deref() == Some("payment_intent")
        || raw.kind.starts_with("payment_intent.");
    let outcome = match raw.kind.as_str() {
        "payment_intent.succeeded" => Some(IntentStatus::Succeeded),
        "payment_intent.processing" => Some(IntentStatus::Processing),
        "payment_intent.canceled" => Some(IntentStatus::Canceled),
        "payment_intent.payment_failed" => {
            let reason = raw
                .data
                .object
                .last_payment_error
                .and_then(|e| e.message.or(e.code))
                .unwrap_or_else(|| "payment failed".to_string());
            Some(IntentStatus::Failed { reason })
        }
        _ => None,
    };

    Ok(WebhookEvent {
        id: raw.id,
        kind: raw.kind,
        intent_id: if is_intent { raw.data.object.id } else { None },
        outcome,
    })
}
