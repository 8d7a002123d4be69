//! Per-landlord and per-tenant views across rentals

use super::LedgerService;
use super::payments::redact_for;
use crate::core::auth::{AuthContext, AuthPolicy};
use crate::core::error::LedgerResult;
use crate::core::month::YearMonth;
use crate::entities::{Payment, PaymentStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Money owed to and received by one landlord
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandlordSummary {
    pub landlord_id: Uuid,
    pub active_rentals: usize,
    pub received_cents: i64,
    pub processing_cents: i64,
    /// Early-termination penalties inside `received_cents`
    pub penalties_received_cents: i64,
    /// Overdue and due rent across all rentals
    pub outstanding_cents: i64,
    /// Settled rent per covered month
    pub by_month: BTreeMap<YearMonth, i64>,
}

impl LedgerService {
    pub async fn landlord_summary(
        &self,
        actor: &AuthContext,
        landlord_id: Uuid,
    ) -> LedgerResult<LandlordSummary> {
        actor.require(&AuthPolicy::owner_or_admin([landlord_id]))?;

        let rentals = self.store.list_rentals_by_landlord(&landlord_id).await?;
        let payments = self.store.list_payments_by_landlord(&landlord_id).await?;

        let mut outstanding_cents = 0;
        for rental in &rentals {
            let ledger = self.build_ledger(rental).await?;
            outstanding_cents += ledger.outstanding_cents;
        }

        let mut summary = LandlordSummary {
            landlord_id,
            active_rentals: rentals.iter().filter(|r| r.is_active()).count(),
            received_cents: 0,
            processing_cents: 0,
            penalties_received_cents: 0,
            outstanding_cents,
            by_month: BTreeMap::new(),
        };

        for payment in &payments {
            match payment.status {
                PaymentStatus::Succeeded => {
                    summary.received_cents += payment.amount_cents;
                    summary.penalties_received_cents += payment.penalty_cents;
                    for line in &payment.lines {
                        *summary.by_month.entry(line.month).or_insert(0) += line.amount_cents;
                    }
                }
                PaymentStatus::Processing => summary.processing_cents += payment.amount_cents,
                PaymentStatus::Failed | PaymentStatus::Canceled => {}
            }
        }

        Ok(summary)
    }

    /// Every payment a tenant made, across rentals, oldest first
    pub async fn tenant_payments(
        &self,
        actor: &AuthContext,
        tenant_id: Uuid,
    ) -> LedgerResult<Vec<Payment>> {
        actor.require(&AuthPolicy::owner_or_admin([tenant_id]))?;
        let payments = self.store.list_payments_by_tenant(&tenant_id).await?;
        Ok(redact_for(actor, payments))
    }
}
