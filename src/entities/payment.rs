//! Payment record
//!
//! A payment covers one contiguous run of months of a single rental and is
//! backed by exactly one provider payment intent.

use crate::core::month::YearMonth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Local state of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Intent created, outcome not known yet
    Processing,
    /// Settled; terminal
    Succeeded,
    /// Charge failed; months are released
    Failed,
    /// Intent canceled; months are released
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }

    /// Whether a payment in this state keeps its months claimed
    pub fn holds_months(&self) -> bool {
        matches!(self, PaymentStatus::Processing | PaymentStatus::Succeeded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Canceled)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rent charged for one month of a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCharge {
    pub month: YearMonth,
    pub amount_cents: i64,
    /// True when the month was charged for part of its days
    pub prorated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub rental_id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    /// Sorted, contiguous months covered by this payment
    pub months: Vec<YearMonth>,
    pub lines: Vec<MonthCharge>,
    pub rent_cents: i64,
    pub penalty_cents: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn covers(&self, month: YearMonth) -> bool {
        self.months.contains(&month)
    }

    /// Whether this payment currently claims `month`
    pub fn holds(&self, month: YearMonth) -> bool {
        self.status.holds_months() && self.covers(month)
    }

    pub fn first_month(&self) -> Option<YearMonth> {
        self.months.first().copied()
    }

    pub fn last_month(&self) -> Option<YearMonth> {
        self.months.last().copied()
    }

    /// Copy without the client secret, for responses to anyone but the payer
    pub fn redacted(mut self) -> Self {
        self.client_secret = None;
        self
    }
}
