//! In-memory ledger store for testing and development

use crate::core::month::YearMonth;
use crate::core::store::{ClaimOutcome, ListingStore, PaymentPatch, PaymentStore, RentalStore};
use crate::entities::{Listing, MoveOutNotice, Payment, PaymentStatus, Rental, RentalStatus};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    listings: HashMap<Uuid, Listing>,
    rentals: HashMap<Uuid, Rental>,
    payments: HashMap<Uuid, Payment>,
    /// (rental, month) -> payment holding it
    claims: HashMap<(Uuid, YearMonth), Uuid>,
    events: HashSet<String>,
}

impl MemoryState {
    fn conflicts(&self, rental_id: Uuid, months: &[YearMonth], owner: Uuid) -> Vec<YearMonth> {
        months
            .iter()
            .filter(|m| {
                self.claims
                    .get(&(rental_id, **m))
                    .is_some_and(|holder| *holder != owner)
            })
            .copied()
            .collect()
    }

    fn claim(&mut self, rental_id: Uuid, months: &[YearMonth], owner: Uuid) {
        for month in months {
            self.claims.insert((rental_id, *month), owner);
        }
    }

    fn release(&mut self, rental_id: Uuid, months: &[YearMonth], owner: Uuid) {
        for month in months {
            if self.claims.get(&(rental_id, *month)) == Some(&owner) {
                self.claims.remove(&(rental_id, *month));
            }
        }
    }
}

/// In-memory store implementing every ledger storage trait
///
/// All collections sit behind one lock, so claiming months and writing the
/// payment happen atomically.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))
    }
}

fn sorted_by_creation<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by_key(|item| created_at(item));
    items
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn create_listing(&self, listing: Listing) -> Result<Listing> {
        let mut state = self.write()?;
        state.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn get_listing(&self, id: &Uuid) -> Result<Option<Listing>> {
        Ok(self.read()?.listings.get(id).cloned())
    }
}

#[async_trait]
impl RentalStore for InMemoryStore {
    async fn create_rental(&self, rental: Rental) -> Result<Option<Rental>> {
        let mut state = self.write()?;
        let duplicate = state.rentals.values().any(|r| {
            r.tenant_id == rental.tenant_id
                && r.listing_id == rental.listing_id
                && r.status == RentalStatus::Active
        });
        if duplicate {
            return Ok(None);
        }
        state.rentals.insert(rental.id, rental.clone());
        Ok(Some(rental))
    }

    async fn get_rental(&self, id: &Uuid) -> Result<Option<Rental>> {
        Ok(self.read()?.rentals.get(id).cloned())
    }

    async fn list_rentals_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Rental>> {
        let state = self.read()?;
        let rentals: Vec<Rental> = state
            .rentals
            .values()
            .filter(|r| &r.tenant_id == tenant_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(rentals, |r: &Rental| r.created_at))
    }

    async fn list_rentals_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Rental>> {
        let state = self.read()?;
        let rentals: Vec<Rental> = state
            .rentals
            .values()
            .filter(|r| &r.landlord_id == landlord_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(rentals, |r: &Rental| r.created_at))
    }

    async fn set_move_out(
        &self,
        id: &Uuid,
        notice: MoveOutNotice,
        at: DateTime<Utc>,
    ) -> Result<Option<Rental>> {
        let mut state = self.write()?;
        let Some(rental) = state.rentals.get_mut(id) else {
            return Ok(None);
        };
        if !rental.is_active() || rental.move_out.is_some() {
            return Ok(None);
        }
        rental.move_out = Some(notice);
        rental.updated_at = at;
        Ok(Some(rental.clone()))
    }

    async fn end_rental(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<Rental>> {
        let mut state = self.write()?;
        let Some(rental) = state.rentals.get_mut(id) else {
            return Ok(None);
        };
        if !rental.is_active() {
            return Ok(None);
        }
        rental.status = RentalStatus::Ended;
        rental.updated_at = at;
        Ok(Some(rental.clone()))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment_claiming(&self, payment: Payment) -> Result<ClaimOutcome> {
        let mut state = self.write()?;
        if state.payments.contains_key(&payment.id) {
            return Err(anyhow!("payment {} already exists", payment.id));
        }
        if payment.status.holds_months() {
            let conflicts = state.conflicts(payment.rental_id, &payment.months, payment.id);
            if !conflicts.is_empty() {
                return Ok(ClaimOutcome::Conflict(conflicts));
            }
            state.claim(payment.rental_id, &payment.months, payment.id);
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(ClaimOutcome::Claimed(payment))
    }

    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>> {
        Ok(self.read()?.payments.get(id).cloned())
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .read()?
            .payments
            .values()
            .find(|p| p.intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn list_payments_by_rental(&self, rental_id: &Uuid) -> Result<Vec<Payment>> {
        let state = self.read()?;
        let payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| &p.rental_id == rental_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(payments, |p: &Payment| p.created_at))
    }

    async fn list_payments_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Payment>> {
        let state = self.read()?;
        let payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| &p.landlord_id == landlord_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(payments, |p: &Payment| p.created_at))
    }

    async fn list_payments_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Payment>> {
        let state = self.read()?;
        let payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| &p.tenant_id == tenant_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(payments, |p: &Payment| p.created_at))
    }

    async fn list_processing(&self, created_before: DateTime<Utc>) -> Result<Vec<Payment>> {
        let state = self.read()?;
        let payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Processing && p.created_at < created_before)
            .cloned()
            .collect();
        Ok(sorted_by_creation(payments, |p: &Payment| p.created_at))
    }

    async fn attach_intent(
        &self,
        id: &Uuid,
        intent_id: &str,
        client_secret: Option<String>,
    ) -> Result<Option<Payment>> {
        let mut state = self.write()?;
        let Some(payment) = state.payments.get_mut(id) else {
            return Ok(None);
        };
        payment.intent_id = Some(intent_id.to_string());
        payment.client_secret = client_secret;
        Ok(Some(payment.clone()))
    }

    async fn transition_payment(
        &self,
        id: &Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<Option<Payment>> {
        let mut state = self.write()?;
        let Some(payment) = state.payments.get_mut(id) else {
            return Ok(None);
        };
        if payment.status != expected {
            return Ok(None);
        }
        payment.status = patch.status;
        payment.failure_reason = patch.failure_reason;
        payment.settled_at = patch.settled_at;
        payment.updated_at = patch.updated_at;
        let updated = payment.clone();

        if !updated.status.holds_months() {
            state.release(updated.rental_id, &updated.months, updated.id);
        }
        Ok(Some(updated))
    }

    async fn reclaim_and_settle(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<ClaimOutcome>> {
        let mut state = self.write()?;
        let Some(payment) = state.payments.get(id).cloned() else {
            return Ok(None);
        };
        if payment.status != PaymentStatus::Failed {
            return Ok(None);
        }

        let conflicts = state.conflicts(payment.rental_id, &payment.months, payment.id);
        if !conflicts.is_empty() {
            return Ok(Some(ClaimOutcome::Conflict(conflicts)));
        }
        state.claim(payment.rental_id, &payment.months, payment.id);

        let stored = state
            .payments
            .get_mut(id)
            .ok_or_else(|| anyhow!("payment {} vanished under lock", id))?;
        stored.status = PaymentStatus::Succeeded;
        stored.settled_at = Some(at);
        stored.updated_at = at;
        Ok(Some(ClaimOutcome::Claimed(stored.clone())))
    }

    async fn record_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.write()?.events.insert(event_id.to_string()))
    }

    async fn forget_event(&self, event_id: &str) -> Result<()> {
        self.write()?.events.remove(event_id);
        Ok(())
    }
}
