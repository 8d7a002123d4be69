//! Month ledger of a rental
//!
//! The ledger is derived, never stored: it is recomputed from the rental and
//! its payments every time it is needed, so it cannot drift from the payment
//! records that back it.
//!
//! ```text
//!  start ─────────── current ─────────── horizon ── end+1
//!  Paid | Processing | Overdue | Due | Upcoming | Blocked
//! ```

pub mod move_out;
pub mod pricing;
pub mod selection;

pub use move_out::assess_move_out;
pub use pricing::{Quote, month_charge, quote};
pub use selection::validate_selection;

use crate::config::LedgerConfig;
use crate::core::month::YearMonth;
use crate::entities::{Payment, PaymentStatus, Rental, RentalStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment state of one month of a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthStatus {
    /// Covered by a succeeded payment
    Paid,
    /// Covered by a payment whose outcome is pending
    Processing,
    /// Unpaid and in the past
    Overdue,
    /// Unpaid current month
    Due,
    /// Unpaid future month that may be prepaid
    Upcoming,
    /// Cannot be paid: after move-out, past the prepay horizon, or rental ended
    Blocked,
}

impl MonthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonthStatus::Paid => "paid",
            MonthStatus::Processing => "processing",
            MonthStatus::Overdue => "overdue",
            MonthStatus::Due => "due",
            MonthStatus::Upcoming => "upcoming",
            MonthStatus::Blocked => "blocked",
        }
    }

    /// Unpaid and open for selection
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            MonthStatus::Overdue | MonthStatus::Due | MonthStatus::Upcoming
        )
    }
}

impl fmt::Display for MonthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub month: YearMonth,
    pub status: MonthStatus,
    /// Rent owed for the month, after proration
    pub amount_cents: i64,
    /// Payment holding the month, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ledger {
    pub rental_id: Uuid,
    pub current_month: YearMonth,
    pub entries: Vec<LedgerEntry>,
    /// Earliest month a new payment must start at
    pub next_payable: Option<YearMonth>,
    /// Overdue plus due rent, plus any pending move-out penalty
    pub outstanding_cents: i64,
    pub paid_cents: i64,
    pub processing_cents: i64,
    /// Move-out penalty not yet covered by a payment
    pub pending_penalty_cents: i64,
    /// Last month of the rental once a move-out notice exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_month: Option<YearMonth>,
    pub currency: String,
}

impl Ledger {
    pub fn entry(&self, month: YearMonth) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.month == month)
    }

    pub fn status_of(&self, month: YearMonth) -> Option<MonthStatus> {
        self.entry(month).map(|e| e.status)
    }

    /// The penalty can only be paid on its own once the end month is taken
    pub fn penalty_payable_alone(&self) -> bool {
        self.pending_penalty_cents > 0
            && self
                .end_month
                .and_then(|end| self.status_of(end))
                .is_some_and(|s| matches!(s, MonthStatus::Paid | MonthStatus::Processing))
    }
}

/// Classify every month of `rental` as of `today`
pub fn build_ledger(
    rental: &Rental,
    payments: &[Payment],
    today: NaiveDate,
    config: &LedgerConfig,
) -> Ledger {
    let current = YearMonth::from_date(today);
    let start = rental.start_month();
    let end = rental.end_month();
    let prepay_limit = current.add_months(config.max_prepay_months as i32);

    let mut last_shown = match end {
        Some(end) => end.next(),
        None => prepay_limit.max(start),
    };
    // Never hide a month someone has paid for
    if let Some(held) = payments
        .iter()
        .filter(|p| p.status.holds_months())
        .filter_map(Payment::last_month)
        .max()
    {
        last_shown = last_shown.max(held);
    }

    let entries: Vec<LedgerEntry> = YearMonth::range_inclusive(start, last_shown)
        .into_iter()
        .map(|month| {
            let holder = payments.iter().find(|p| p.holds(month));
            let status = match holder.map(|p| p.status) {
                Some(PaymentStatus::Succeeded) => MonthStatus::Paid,
                Some(_) => MonthStatus::Processing,
                None => classify_unheld(rental, month, current, end, prepay_limit),
            };
            // Held months report what their payment charged, even if a later
            // notice changed the proration
            let charged = holder.and_then(|p| p.lines.iter().find(|l| l.month == month));
            let amount_cents = match charged {
                Some(line) => line.amount_cents,
                None if end.is_some_and(|end| month > end) => 0,
                None => month_charge(rental, month).amount_cents,
            };
            LedgerEntry {
                month,
                status,
                amount_cents,
                payment_id: holder.map(|p| p.id),
            }
        })
        .collect();

    let sum_where = |pred: fn(MonthStatus) -> bool| -> i64 {
        entries
            .iter()
            .filter(|e| pred(e.status))
            .map(|e| e.amount_cents)
            .sum()
    };

    let next_payable = entries
        .iter()
        .find(|e| e.status.is_payable())
        .map(|e| e.month);

    let penalty_carried = payments
        .iter()
        .any(|p| p.status.holds_months() && p.penalty_cents > 0);
    let pending_penalty_cents = match &rental.move_out {
        Some(notice) if !penalty_carried => notice.penalty_cents,
        _ => 0,
    };

    Ledger {
        rental_id: rental.id,
        current_month: current,
        outstanding_cents: sum_where(|s| matches!(s, MonthStatus::Overdue | MonthStatus::Due))
            + pending_penalty_cents,
        paid_cents: sum_where(|s| s == MonthStatus::Paid),
        processing_cents: sum_where(|s| s == MonthStatus::Processing),
        next_payable,
        pending_penalty_cents,
        end_month: end,
        currency: rental.currency.clone(),
        entries,
    }
}

fn classify_unheld(
    rental: &Rental,
    month: YearMonth,
    current: YearMonth,
    end: Option<YearMonth>,
    prepay_limit: YearMonth,
) -> MonthStatus {
    if end.is_some_and(|end| month > end) || month > prepay_limit {
        return MonthStatus::Blocked;
    }
    if rental.status == RentalStatus::Ended && month > current {
        return MonthStatus::Blocked;
    }
    if month < current {
        MonthStatus::Overdue
    } else if month == current {
        MonthStatus::Due
    } else {
        MonthStatus::Upcoming
    }
}
