//! Validation of the months a tenant wants to pay

use super::Ledger;
use crate::core::error::{LedgerResult, PaymentError};
use crate::core::month::{YearMonth, normalize_selection};

/// Check a selection against the ledger and return it sorted
///
/// A valid selection is non-empty, duplicate-free and contiguous, contains
/// only payable months, and starts at the ledger's earliest payable month so
/// that no unpaid month is ever skipped.
///
/// An empty selection is accepted only to pay a pending move-out penalty
/// whose end month is already paid or processing.
pub fn validate_selection(ledger: &Ledger, requested: &[YearMonth]) -> LedgerResult<Vec<YearMonth>> {
    if requested.is_empty() && ledger.penalty_payable_alone() {
        return Ok(Vec::new());
    }

    let months = normalize_selection(requested)?;

    for month in &months {
        let status = ledger
            .status_of(*month)
            .ok_or(PaymentError::MonthOutOfRange { month: *month })?;
        if !status.is_payable() {
            return Err(PaymentError::MonthUnavailable {
                month: *month,
                status,
            }
            .into());
        }
    }

    let expected = ledger.next_payable.ok_or(PaymentError::NothingPayable)?;
    if months[0] != expected {
        return Err(PaymentError::MustStartAt {
            expected,
            requested: months[0],
        }
        .into());
    }

    Ok(months)
}
