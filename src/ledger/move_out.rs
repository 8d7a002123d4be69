//! Move-out notices and short-notice penalties

use crate::config::LedgerConfig;
use crate::core::error::{LedgerResult, RentalError};
use crate::core::month::YearMonth;
use crate::entities::{MoveOutNotice, Payment, Rental};
use chrono::NaiveDate;

/// Validate a notice to vacate and compute its penalty
///
/// The notice is short when fewer than `notice_days` days separate the notice
/// from the move-out date; a short notice owes `penalty_percent` of one
/// month's rent. Months already held by a payment must not fall after the
/// new end month.
pub fn assess_move_out(
    rental: &Rental,
    payments: &[Payment],
    notice_date: NaiveDate,
    move_out_date: NaiveDate,
    config: &LedgerConfig,
) -> LedgerResult<MoveOutNotice> {
    if !rental.is_active() {
        return Err(RentalError::NotActive { id: rental.id }.into());
    }
    if rental.move_out.is_some() {
        return Err(RentalError::MoveOutAlreadySubmitted { id: rental.id }.into());
    }
    if move_out_date < notice_date {
        return Err(RentalError::InvalidMoveOut {
            message: format!(
                "move-out date {} is before the notice date {}",
                move_out_date, notice_date
            ),
        }
        .into());
    }
    if move_out_date < rental.start_date {
        return Err(RentalError::InvalidMoveOut {
            message: format!(
                "move-out date {} is before the rental starts on {}",
                move_out_date, rental.start_date
            ),
        }
        .into());
    }

    let end_month = YearMonth::from_date(move_out_date);
    if let Some(month) = payments
        .iter()
        .filter(|p| p.status.holds_months())
        .flat_map(|p| p.months.iter().copied())
        .filter(|m| *m > end_month)
        .max()
    {
        return Err(RentalError::PaidBeyondMoveOut { month }.into());
    }

    let lead_days = (move_out_date - notice_date).num_days();
    let short_notice = lead_days < config.notice_days;
    let penalty_cents = if short_notice {
        rental.monthly_rent_cents * config.penalty_percent as i64 / 100
    } else {
        0
    };

    if short_notice {
        tracing::debug!(
            rental_id = %rental.id,
            lead_days,
            penalty_cents,
            "short move-out notice"
        );
    }

    Ok(MoveOutNotice {
        notice_date,
        move_out_date,
        penalty_cents,
        short_notice,
    })
}
