//! Ledger service: the operations behind every HTTP route
//!
//! `LedgerService` ties together the store, the payment gateway, the clock
//! and the event bus. Every public operation takes the caller's
//! [`AuthContext`] and enforces its own access rules, so the HTTP layer only
//! decodes requests and encodes responses.

mod payments;
mod summary;

pub use payments::{CheckoutReceipt, ReconcileReport, WebhookAck, WebhookAction};
pub use summary::LandlordSummary;

use crate::config::{AppConfig, LedgerConfig, ReconcileConfig};
use crate::core::auth::{AuthContext, AuthPolicy, Role};
use crate::core::clock::Clock;
use crate::core::error::{LedgerResult, RentalError, RequestError};
use crate::core::events::{EventBus, LedgerEvent};
use crate::core::month::{YearMonth, parse_selection};
use crate::core::store::LedgerStore;
use crate::entities::{Listing, Rental};
use crate::gateway::{PaymentGateway, WebhookVerifier};
use crate::ledger::{self, Ledger, Quote};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewListing {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,

    #[validate(range(
        min = 1,
        max = 1_000_000_000,
        message = "monthly_rent_cents must be between 1 and 1000000000"
    ))]
    pub monthly_rent_cents: i64,

    #[validate(length(equal = 3, message = "currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,

    /// Required when an admin creates a listing on a landlord's behalf
    pub landlord_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRental {
    pub listing_id: Uuid,

    /// Defaults to the caller when a tenant books for themselves
    pub tenant_id: Option<Uuid>,

    pub start_date: NaiveDate,

    /// Overrides the listing's asking rent
    #[validate(range(
        min = 1,
        max = 1_000_000_000,
        message = "monthly_rent_cents must be between 1 and 1000000000"
    ))]
    pub monthly_rent_cents: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveOutRequest {
    /// Only admins may backdate a notice; everyone else gives notice today
    pub notice_date: Option<NaiveDate>,
    pub move_out_date: NaiveDate,
}

/// Months as sent by clients, `"YYYY-MM"` each
#[derive(Debug, Clone, Deserialize)]
pub struct MonthSelection {
    pub months: Vec<String>,
}

impl MonthSelection {
    pub fn parse(&self) -> LedgerResult<Vec<YearMonth>> {
        Ok(parse_selection(&self.months)?)
    }
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    verifier: WebhookVerifier,
    ledger_config: LedgerConfig,
    reconcile_config: ReconcileConfig,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            events,
            verifier: WebhookVerifier::new(
                config.payments.webhook_secret.clone(),
                config.payments.webhook_tolerance_secs,
            ),
            ledger_config: config.ledger.clone(),
            reconcile_config: config.reconcile.clone(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // -----------------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------------

    pub async fn create_listing(&self, actor: &AuthContext, request: NewListing) -> LedgerResult<Listing> {
        actor.require(&AuthPolicy::HasRole(vec![Role::Landlord, Role::Admin]))?;
        request.validate()?;

        let landlord_id = match (actor, request.landlord_id) {
            (AuthContext::Landlord { user_id }, None) => *user_id,
            (AuthContext::Landlord { user_id }, Some(id)) if id == *user_id => id,
            (AuthContext::Admin { .. }, Some(id)) => id,
            (AuthContext::Admin { .. }, None) => {
                return Err(RequestError::InvalidBody {
                    message: "landlord_id is required when an admin creates a listing".to_string(),
                }
                .into());
            }
            _ => {
                return Err(RequestError::Forbidden {
                    message: "landlords may only create their own listings".to_string(),
                }
                .into());
            }
        };

        let currency = request
            .currency
            .unwrap_or_else(|| self.ledger_config.default_currency.clone());
        let listing = Listing::new(landlord_id, request.title, request.monthly_rent_cents, currency);
        let listing = self.store.create_listing(listing).await?;

        tracing::info!(listing_id = %listing.id, landlord_id = %landlord_id, "listing created");
        Ok(listing)
    }

    pub async fn get_listing(&self, id: Uuid) -> LedgerResult<Listing> {
        self.store
            .get_listing(&id)
            .await?
            .ok_or_else(|| RentalError::ListingNotFound { id }.into())
    }

    // -----------------------------------------------------------------------
    // Rentals
    // -----------------------------------------------------------------------

    pub async fn create_rental(&self, actor: &AuthContext, request: NewRental) -> LedgerResult<Rental> {
        actor.require(&AuthPolicy::Authenticated)?;
        request.validate()?;

        let listing = self.get_listing(request.listing_id).await?;

        let tenant_id = match (actor, request.tenant_id) {
            (AuthContext::Tenant { user_id }, None) => *user_id,
            (AuthContext::Tenant { user_id }, Some(id)) if id == *user_id => id,
            (AuthContext::Landlord { user_id }, Some(id)) if *user_id == listing.landlord_id => id,
            (AuthContext::Admin { .. }, Some(id)) => id,
            (AuthContext::Landlord { .. } | AuthContext::Admin { .. }, None) => {
                return Err(RequestError::InvalidBody {
                    message: "tenant_id is required".to_string(),
                }
                .into());
            }
            _ => {
                return Err(RequestError::Forbidden {
                    message: "cannot create a rental for this tenant or listing".to_string(),
                }
                .into());
            }
        };

        let rental = Rental::new(
            listing.id,
            tenant_id,
            listing.landlord_id,
            request.start_date,
            request.monthly_rent_cents.unwrap_or(listing.monthly_rent_cents),
            listing.currency.clone(),
        );

        let rental = self
            .store
            .create_rental(rental)
            .await?
            .ok_or(RentalError::AlreadyActive {
                tenant_id,
                listing_id: listing.id,
            })?;

        tracing::info!(
            rental_id = %rental.id,
            listing_id = %listing.id,
            tenant_id = %tenant_id,
            start_date = %rental.start_date,
            "rental created"
        );
        self.events.publish(LedgerEvent::RentalCreated {
            rental_id: rental.id,
            listing_id: rental.listing_id,
            tenant_id,
        });
        Ok(rental)
    }

    /// Rental visible to its tenant, its landlord and admins
    pub async fn get_rental(&self, actor: &AuthContext, id: Uuid) -> LedgerResult<Rental> {
        let rental = self.load_rental(id).await?;
        actor.require(&reader_policy(&rental))?;
        Ok(rental)
    }

    pub async fn ledger(&self, actor: &AuthContext, rental_id: Uuid) -> LedgerResult<Ledger> {
        let rental = self.get_rental(actor, rental_id).await?;
        self.build_ledger(&rental).await
    }

    pub async fn quote(
        &self,
        actor: &AuthContext,
        rental_id: Uuid,
        months: &[YearMonth],
    ) -> LedgerResult<Quote> {
        let rental = self.get_rental(actor, rental_id).await?;
        let ledger = self.build_ledger(&rental).await?;
        let months = ledger::validate_selection(&ledger, months)?;
        Ok(ledger::quote(&rental, &months, ledger.pending_penalty_cents))
    }

    pub async fn submit_move_out(
        &self,
        actor: &AuthContext,
        rental_id: Uuid,
        request: MoveOutRequest,
    ) -> LedgerResult<Rental> {
        let rental = self.load_rental(rental_id).await?;
        actor.require(&AuthPolicy::Or(vec![
            tenant_policy(&rental),
            AuthPolicy::AdminOnly,
        ]))?;

        let today = self.clock.today();
        let notice_date = match request.notice_date {
            Some(date) if actor.is_admin() => date,
            Some(date) if date != today => {
                return Err(RentalError::InvalidMoveOut {
                    message: format!("notice date must be today ({})", today),
                }
                .into());
            }
            _ => today,
        };

        let payments = self.store.list_payments_by_rental(&rental.id).await?;
        let notice = ledger::assess_move_out(
            &rental,
            &payments,
            notice_date,
            request.move_out_date,
            &self.ledger_config,
        )?;

        let updated = match self
            .store
            .set_move_out(&rental.id, notice.clone(), self.clock.now())
            .await?
        {
            Some(updated) => updated,
            // Lost a race with another notice or with the rental ending
            None => {
                let current = self.load_rental(rental_id).await?;
                return Err(if current.is_active() {
                    RentalError::MoveOutAlreadySubmitted { id: rental_id }
                } else {
                    RentalError::NotActive { id: rental_id }
                }
                .into());
            }
        };

        tracing::info!(
            rental_id = %rental_id,
            move_out_date = %notice.move_out_date,
            short_notice = notice.short_notice,
            penalty_cents = notice.penalty_cents,
            "move-out notice submitted"
        );
        self.events.publish(LedgerEvent::MoveOutSubmitted {
            rental_id,
            move_out_month: notice.end_month(),
            penalty_cents: notice.penalty_cents,
        });
        Ok(updated)
    }

    /// Close a rental; past unpaid months stay payable, future ones are blocked
    pub async fn end_rental(&self, actor: &AuthContext, rental_id: Uuid) -> LedgerResult<Rental> {
        let rental = self.load_rental(rental_id).await?;
        actor.require(&AuthPolicy::owner_or_admin([rental.landlord_id]))?;

        let ended = self
            .store
            .end_rental(&rental_id, self.clock.now())
            .await?
            .ok_or(RentalError::NotActive { id: rental_id })?;

        tracing::info!(rental_id = %rental_id, "rental ended");
        self.events.publish(LedgerEvent::RentalEnded { rental_id });
        Ok(ended)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_rental(&self, id: Uuid) -> LedgerResult<Rental> {
        self.store
            .get_rental(&id)
            .await?
            .ok_or_else(|| RentalError::NotFound { id }.into())
    }

    async fn build_ledger(&self, rental: &Rental) -> LedgerResult<Ledger> {
        let payments = self.store.list_payments_by_rental(&rental.id).await?;
        Ok(ledger::build_ledger(
            rental,
            &payments,
            self.clock.today(),
            &self.ledger_config,
        ))
    }
}

/// Tenant, landlord or admin
fn reader_policy(rental: &Rental) -> AuthPolicy {
    AuthPolicy::owner_or_admin([rental.tenant_id, rental.landlord_id])
}

/// The rental's own tenant, acting as a tenant
fn tenant_policy(rental: &Rental) -> AuthPolicy {
    AuthPolicy::And(vec![
        AuthPolicy::HasRole(vec![Role::Tenant]),
        AuthPolicy::Owner(vec![rental.tenant_id]),
    ])
}

#[cfg(test)]
mod tests;
