//! Storage traits for listings, rentals and payments
//!
//! Backends return `anyhow::Result` for infrastructure failures and encode
//! business outcomes (duplicate rental, month already claimed, stale state)
//! in the `Ok` value so the service can turn them into typed errors.
//!
//! The one invariant every backend must enforce atomically: a month of a
//! rental is held by at most one payment whose status holds months
//! (`processing` or `succeeded`).

use crate::core::month::YearMonth;
use crate::entities::{Listing, MoveOutNotice, Payment, PaymentStatus, Rental};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of trying to claim months for a payment
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// All months were free; the payment is stored and holds them
    Claimed(Payment),
    /// These months are held by another payment; nothing was written
    Conflict(Vec<YearMonth>),
}

/// Fields written by a payment status transition
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPatch {
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentPatch {
    pub fn settle(at: DateTime<Utc>) -> Self {
        Self {
            status: PaymentStatus::Succeeded,
            failure_reason: None,
            settled_at: Some(at),
            updated_at: at,
        }
    }

    pub fn release(status: PaymentStatus, reason: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status,
            failure_reason: reason,
            settled_at: None,
            updated_at: at,
        }
    }
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn create_listing(&self, listing: Listing) -> Result<Listing>;

    async fn get_listing(&self, id: &Uuid) -> Result<Option<Listing>>;
}

#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Store a rental; `None` if the tenant already has an active rental for
    /// the same listing
    async fn create_rental(&self, rental: Rental) -> Result<Option<Rental>>;

    async fn get_rental(&self, id: &Uuid) -> Result<Option<Rental>>;

    async fn list_rentals_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Rental>>;

    async fn list_rentals_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Rental>>;

    /// Attach a move-out notice if the rental is active and has none yet
    async fn set_move_out(
        &self,
        id: &Uuid,
        notice: MoveOutNotice,
        at: DateTime<Utc>,
    ) -> Result<Option<Rental>>;

    /// Mark an active rental ended; `None` if it is missing or already ended
    async fn end_rental(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<Rental>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Store `payment` and claim its months in one atomic step
    async fn insert_payment_claiming(&self, payment: Payment) -> Result<ClaimOutcome>;

    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>>;

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>>;

    /// Oldest first
    async fn list_payments_by_rental(&self, rental_id: &Uuid) -> Result<Vec<Payment>>;

    async fn list_payments_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Payment>>;

    async fn list_payments_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Payment>>;

    /// Processing payments created before `created_before`
    async fn list_processing(&self, created_before: DateTime<Utc>) -> Result<Vec<Payment>>;

    async fn attach_intent(
        &self,
        id: &Uuid,
        intent_id: &str,
        client_secret: Option<String>,
    ) -> Result<Option<Payment>>;

    /// Apply `patch` only if the payment is still in `expected`
    ///
    /// Moving to a status that does not hold months releases the payment's
    /// claims in the same step. `None` when the payment is missing or its
    /// status changed underneath.
    async fn transition_payment(
        &self,
        id: &Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<Option<Payment>>;

    /// Re-claim the months of a failed payment and mark it succeeded
    ///
    /// `None` when the payment is missing or no longer failed.
    async fn reclaim_and_settle(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<ClaimOutcome>>;

    /// Remember a provider event id; `false` if it was already recorded
    async fn record_event(&self, event_id: &str) -> Result<bool>;

    /// Drop a recorded event id so a retried delivery is processed again
    async fn forget_event(&self, event_id: &str) -> Result<()>;
}

/// Everything the ledger service needs from a backend
pub trait LedgerStore: ListingStore + RentalStore + PaymentStore {}

impl<T> LedgerStore for T where T: ListingStore + RentalStore + PaymentStore {}
