//! Checkout, provider outcomes and the reconciliation sweep

use super::{LedgerService, tenant_policy};
use crate::core::auth::{AuthContext, AuthPolicy};
use crate::core::error::{LedgerResult, PaymentError};
use crate::core::events::LedgerEvent;
use crate::core::month::YearMonth;
use crate::core::store::{ClaimOutcome, PaymentPatch};
use crate::entities::{Payment, PaymentStatus};
use crate::gateway::{IntentRequest, IntentStatus, parse_event};
use crate::ledger;
use crate::reconcile::{Transition, apply_outcome};
use chrono::Duration;
use serde::Serialize;
use uuid::Uuid;

/// Returned to the tenant after a checkout was opened
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub payment: Payment,
    /// Handed to the provider's client SDK to collect the card
    pub client_secret: Option<String>,
    pub provider: &'static str,
}

/// What a provider outcome did to the local payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Settled,
    Released,
    LateSettled,
    Unchanged,
    Duplicate,
    Ignored,
    UnknownIntent,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub action: WebhookAction,
}

/// Counters from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub settled: usize,
    pub released: usize,
    pub abandoned: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl LedgerService {
    /// Claim `months` for the caller's rental and open a provider intent
    pub async fn checkout(
        &self,
        actor: &AuthContext,
        rental_id: Uuid,
        months: &[YearMonth],
    ) -> LedgerResult<CheckoutReceipt> {
        let rental = self.load_rental(rental_id).await?;
        actor.require(&tenant_policy(&rental))?;

        let ledger = self.build_ledger(&rental).await?;
        let months = ledger::validate_selection(&ledger, months)?;
        let quote = ledger::quote(&rental, &months, ledger.pending_penalty_cents);
        if quote.total_cents <= 0 {
            return Err(PaymentError::NothingPayable.into());
        }

        let now = self.clock.now();
        let payment = Payment {
            id: Uuid::new_v4(),
            rental_id: rental.id,
            tenant_id: rental.tenant_id,
            landlord_id: rental.landlord_id,
            months: quote.months,
            lines: quote.lines,
            rent_cents: quote.rent_cents,
            penalty_cents: quote.penalty_cents,
            amount_cents: quote.total_cents,
            currency: quote.currency,
            status: PaymentStatus::Processing,
            intent_id: None,
            client_secret: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            settled_at: None,
        };

        let payment = match self.store.insert_payment_claiming(payment).await? {
            ClaimOutcome::Claimed(payment) => payment,
            ClaimOutcome::Conflict(months) => {
                tracing::info!(rental_id = %rental_id, ?months, "checkout lost the race for months");
                return Err(PaymentError::MonthsAlreadyClaimed { months }.into());
            }
        };

        tracing::info!(
            payment_id = %payment.id,
            rental_id = %rental_id,
            months = ?payment.months,
            amount_cents = payment.amount_cents,
            "payment initiated"
        );
        self.events.publish(LedgerEvent::PaymentInitiated {
            payment_id: payment.id,
            rental_id,
            months: payment.months.clone(),
            amount_cents: payment.amount_cents,
        });

        let request = IntentRequest {
            payment_id: payment.id,
            rental_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency.to_lowercase(),
            months: payment.months.clone(),
        };

        let intent = match self.gateway.create_intent(&request).await {
            Ok(intent) => intent,
            Err(err) => {
                tracing::warn!(payment_id = %payment.id, error = %err, "payment provider refused checkout");
                self.release(&payment, PaymentStatus::Failed, Some(err.to_string()))
                    .await?;
                return Err(PaymentError::Gateway {
                    message: err.to_string(),
                }
                .into());
            }
        };

        let payment = self
            .store
            .attach_intent(&payment.id, &intent.id, intent.client_secret.clone())
            .await?
            .ok_or(PaymentError::NotFound { id: payment.id })?;

        // Some providers settle synchronously
        let payment = match intent.status {
            IntentStatus::Processing | IntentStatus::RequiresAction => payment,
            ref outcome => self.apply_intent_outcome(payment, outcome).await?.0,
        };

        Ok(CheckoutReceipt {
            payment,
            client_secret: intent.client_secret,
            provider: self.gateway.name(),
        })
    }

    /// Payments of a rental, oldest first
    pub async fn rental_payments(
        &self,
        actor: &AuthContext,
        rental_id: Uuid,
    ) -> LedgerResult<Vec<Payment>> {
        let rental = self.get_rental(actor, rental_id).await?;
        let payments = self.store.list_payments_by_rental(&rental.id).await?;
        Ok(redact_for(actor, payments))
    }

    /// Authenticate a provider webhook and apply the outcome it carries
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> LedgerResult<WebhookAck> {
        self.verifier
            .verify(payload, signature, self.clock.now().timestamp())?;
        let event = parse_event(payload)?;

        let ack = |action| WebhookAck {
            event_id: event.id.clone(),
            action,
        };

        let (Some(intent_id), Some(outcome)) = (event.intent_id.as_deref(), event.outcome.as_ref())
        else {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "ignoring webhook event");
            return Ok(ack(WebhookAction::Ignored));
        };

        if !self.store.record_event(&event.id).await? {
            tracing::debug!(event_id = %event.id, "duplicate webhook delivery");
            return Ok(ack(WebhookAction::Duplicate));
        }

        let result: LedgerResult<WebhookAction> = async {
            match self.store.get_payment_by_intent(intent_id).await? {
                Some(payment) => Ok(self.apply_intent_outcome(payment, outcome).await?.1),
                None => {
                    tracing::warn!(event_id = %event.id, intent_id = %intent_id, "webhook for unknown intent");
                    Ok(WebhookAction::UnknownIntent)
                }
            }
        }
        .await;

        match result {
            Ok(action) => {
                tracing::info!(event_id = %event.id, kind = %event.kind, ?action, "webhook processed");
                Ok(ack(action))
            }
            Err(err) => {
                // Let the provider's retry reach us again
                self.store.forget_event(&event.id).await?;
                Err(err)
            }
        }
    }

    /// Ask the provider about a processing payment and apply the answer
    pub async fn poll_payment(&self, actor: &AuthContext, payment_id: Uuid) -> LedgerResult<Payment> {
        let payment = self
            .store
            .get_payment(&payment_id)
            .await?
            .ok_or(PaymentError::NotFound { id: payment_id })?;
        actor.require(&AuthPolicy::owner_or_admin([
            payment.tenant_id,
            payment.landlord_id,
        ]))?;

        let payment = match (payment.status, payment.intent_id.clone()) {
            (PaymentStatus::Processing, Some(intent_id)) => {
                match self.gateway.retrieve_intent(&intent_id).await {
                    Ok(intent) => self.apply_intent_outcome(payment, &intent.status).await?.0,
                    Err(err) => {
                        tracing::warn!(payment_id = %payment_id, error = %err, "could not poll payment provider");
                        payment
                    }
                }
            }
            _ => payment,
        };

        Ok(visible_to(actor, payment))
    }

    /// Resolve processing payments whose webhook never arrived
    ///
    /// Checkouts still waiting on the payer after `abandon_after_secs` are
    /// canceled at the provider so their months become payable again.
    pub async fn reconcile_processing(&self) -> LedgerResult<ReconcileReport> {
        let now = self.clock.now();
        let created_before = now - Duration::seconds(self.reconcile_config.min_age_secs);
        let abandon_before = now - Duration::seconds(self.reconcile_config.abandon_after_secs);

        let mut report = ReconcileReport::default();
        for payment in self.store.list_processing(created_before).await? {
            report.checked += 1;
            let abandoned = payment.created_at < abandon_before;

            let Some(intent_id) = payment.intent_id.clone() else {
                if abandoned {
                    self.release(
                        &payment,
                        PaymentStatus::Failed,
                        Some("checkout never reached the payment provider".to_string()),
                    )
                    .await?;
                    report.abandoned += 1;
                } else {
                    report.unchanged += 1;
                }
                continue;
            };

            let intent = match self.gateway.retrieve_intent(&intent_id).await {
                Ok(intent) => intent,
                Err(err) => {
                    tracing::warn!(payment_id = %payment.id, error = %err, "reconcile poll failed");
                    report.errors += 1;
                    continue;
                }
            };

            let outcome = match intent.status {
                IntentStatus::RequiresAction if abandoned => {
                    match self.gateway.cancel_intent(&intent_id).await {
                        Ok(canceled) => {
                            tracing::info!(payment_id = %payment.id, intent_id = %intent_id, "canceled abandoned checkout");
                            canceled.status
                        }
                        Err(err) => {
                            tracing::warn!(payment_id = %payment.id, error = %err, "could not cancel abandoned checkout");
                            report.errors += 1;
                            continue;
                        }
                    }
                }
                status => status,
            };
            let canceled_here = abandoned && outcome == IntentStatus::Canceled;

            match self.apply_intent_outcome(payment, &outcome).await {
                Ok((_, WebhookAction::Settled | WebhookAction::LateSettled)) => report.settled += 1,
                Ok((_, WebhookAction::Released)) if canceled_here => report.abandoned += 1,
                Ok((_, WebhookAction::Released)) => report.released += 1,
                Ok(_) => report.unchanged += 1,
                Err(err) => {
                    tracing::error!(error = %err, "reconcile could not apply provider outcome");
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                settled = report.settled,
                released = report.released,
                abandoned = report.abandoned,
                errors = report.errors,
                "reconciled processing payments"
            );
        }
        Ok(report)
    }

    /// Perform the transition `outcome` implies for `payment`
    ///
    /// Transitions are conditional on the status `payment` was read in; if a
    /// concurrent webhook or poll got there first, the fresh record is
    /// returned as unchanged.
    pub(super) async fn apply_intent_outcome(
        &self,
        payment: Payment,
        outcome: &IntentStatus,
    ) -> LedgerResult<(Payment, WebhookAction)> {
        let now = self.clock.now();

        match apply_outcome(payment.status, outcome) {
            Transition::Settle => {
                match self
                    .store
                    .transition_payment(&payment.id, PaymentStatus::Processing, PaymentPatch::settle(now))
                    .await?
                {
                    Some(settled) => {
                        tracing::info!(payment_id = %settled.id, months = ?settled.months, "payment settled");
                        self.events.publish(LedgerEvent::PaymentSettled {
                            payment_id: settled.id,
                            rental_id: settled.rental_id,
                            months: settled.months.clone(),
                        });
                        Ok((settled, WebhookAction::Settled))
                    }
                    None => self.reload_unchanged(payment).await,
                }
            }

            Transition::Release { status, reason } => match self.release(&payment, status, reason).await? {
                Some(released) => Ok((released, WebhookAction::Released)),
                None => self.reload_unchanged(payment).await,
            },

            Transition::LateSettle => match self.store.reclaim_and_settle(&payment.id, now).await? {
                Some(ClaimOutcome::Claimed(settled)) => {
                    tracing::warn!(payment_id = %settled.id, "late success for a failed payment, months re-claimed");
                    self.events.publish(LedgerEvent::PaymentSettled {
                        payment_id: settled.id,
                        rental_id: settled.rental_id,
                        months: settled.months.clone(),
                    });
                    Ok((settled, WebhookAction::LateSettled))
                }
                Some(ClaimOutcome::Conflict(months)) => {
                    tracing::error!(
                        payment_id = %payment.id,
                        ?months,
                        amount_cents = payment.amount_cents,
                        "late success for a failed payment whose months were paid again; refund required"
                    );
                    Ok((payment, WebhookAction::Ignored))
                }
                None => self.reload_unchanged(payment).await,
            },

            Transition::Ignored { note } => {
                tracing::error!(payment_id = %payment.id, status = %payment.status, ?outcome, "{}", note);
                Ok((payment, WebhookAction::Ignored))
            }

            Transition::Unchanged => Ok((payment, WebhookAction::Unchanged)),
        }
    }

    /// Move a processing payment to `status`, freeing its months
    async fn release(
        &self,
        payment: &Payment,
        status: PaymentStatus,
        reason: Option<String>,
    ) -> LedgerResult<Option<Payment>> {
        let patch = PaymentPatch::release(status, reason.clone(), self.clock.now());
        let released = self
            .store
            .transition_payment(&payment.id, PaymentStatus::Processing, patch)
            .await?;

        if let Some(released) = &released {
            tracing::info!(
                payment_id = %released.id,
                status = %released.status,
                reason = reason.as_deref().unwrap_or(""),
                "payment released"
            );
            self.events.publish(LedgerEvent::PaymentReleased {
                payment_id: released.id,
                rental_id: released.rental_id,
                months: released.months.clone(),
                reason,
            });
        }
        Ok(released)
    }

    async fn reload_unchanged(&self, payment: Payment) -> LedgerResult<(Payment, WebhookAction)> {
        let current = self.store.get_payment(&payment.id).await?.unwrap_or(payment);
        Ok((current, WebhookAction::Unchanged))
    }
}

/// Client secrets are only shown to the paying tenant
fn visible_to(actor: &AuthContext, payment: Payment) -> Payment {
    match actor {
        AuthContext::Tenant { user_id } if *user_id == payment.tenant_id => payment,
        _ => payment.redacted(),
    }
}

pub(super) fn redact_for(actor: &AuthContext, payments: Vec<Payment>) -> Vec<Payment> {
    payments.into_iter().map(|p| visible_to(actor, p)).collect()
}
