//! Ledger event bus
//!
//! Service operations publish a [`LedgerEvent`] after each state change.
//! Subscribers (notification senders, audit writers, tests) receive them
//! through a `tokio::sync::broadcast` channel.
//!
//! ```text
//! LedgerService ──▶ EventBus::publish() ──▶ broadcast channel ──▶ subscribers
//! ```

use crate::core::month::YearMonth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A state change in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    RentalCreated {
        rental_id: Uuid,
        listing_id: Uuid,
        tenant_id: Uuid,
    },
    /// Months claimed by a new payment
    PaymentInitiated {
        payment_id: Uuid,
        rental_id: Uuid,
        months: Vec<YearMonth>,
        amount_cents: i64,
    },
    /// Payment succeeded; its months are paid
    PaymentSettled {
        payment_id: Uuid,
        rental_id: Uuid,
        months: Vec<YearMonth>,
    },
    /// Payment failed or was canceled; its months are payable again
    PaymentReleased {
        payment_id: Uuid,
        rental_id: Uuid,
        months: Vec<YearMonth>,
        reason: Option<String>,
    },
    MoveOutSubmitted {
        rental_id: Uuid,
        move_out_month: YearMonth,
        penalty_cents: i64,
    },
    RentalEnded {
        rental_id: Uuid,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::RentalCreated { .. } => "rental_created",
            LedgerEvent::PaymentInitiated { .. } => "payment_initiated",
            LedgerEvent::PaymentSettled { .. } => "payment_settled",
            LedgerEvent::PaymentReleased { .. } => "payment_released",
            LedgerEvent::MoveOutSubmitted { .. } => "move_out_submitted",
            LedgerEvent::RentalEnded { .. } => "rental_ended",
        }
    }

    /// Rental the event belongs to
    pub fn rental_id(&self) -> Uuid {
        match self {
            LedgerEvent::RentalCreated { rental_id, .. }
            | LedgerEvent::PaymentInitiated { rental_id, .. }
            | LedgerEvent::PaymentSettled { rental_id, .. }
            | LedgerEvent::PaymentReleased { rental_id, .. }
            | LedgerEvent::MoveOutSubmitted { rental_id, .. }
            | LedgerEvent::RentalEnded { rental_id } => *rental_id,
        }
    }
}

/// Envelope wrapping a ledger event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: LedgerEvent,
}

impl EventEnvelope {
    pub fn new(event: LedgerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// `capacity` bounds how far a slow receiver may lag before it loses events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; returns how many received it
    pub fn publish(&self, event: LedgerEvent) -> usize {
        tracing::debug!(kind = event.kind(), rental_id = %event.rental_id(), "ledger event");
        // send() only errs when nobody is listening
        self.sender.send(EventEnvelope::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
