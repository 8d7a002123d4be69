//! Month charges, proration and quotes

use crate::core::month::YearMonth;
use crate::entities::{MonthCharge, Rental};
use chrono::Datelike;
use serde::Serialize;

/// Price of a month selection before it is charged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub months: Vec<YearMonth>,
    pub lines: Vec<MonthCharge>,
    pub rent_cents: i64,
    pub penalty_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

/// Rent owed for `month`, prorated by occupied days in the first and last month
pub fn month_charge(rental: &Rental, month: YearMonth) -> MonthCharge {
    let days = month.days_in_month();

    let first_day = if month == rental.start_month() {
        rental.start_date.day()
    } else {
        1
    };
    let last_day = match &rental.move_out {
        Some(notice) if notice.end_month() == month => notice.move_out_date.day(),
        _ => days,
    };

    let occupied = if last_day < first_day {
        0
    } else {
        last_day - first_day + 1
    };

    MonthCharge {
        month,
        amount_cents: prorate(rental.monthly_rent_cents, occupied, days),
        prorated: occupied < days,
    }
}

/// `rent * occupied / days`, rounded half up to whole cents
pub fn prorate(rent_cents: i64, occupied: u32, days: u32) -> i64 {
    if occupied >= days || days == 0 {
        return rent_cents;
    }
    let numerator = rent_cents * occupied as i64 * 2 + days as i64;
    numerator / (2 * days as i64)
}

/// Price an already-validated selection
///
/// `pending_penalty_cents` is the move-out penalty no live payment carries
/// yet. It rides on the payment that covers the rental's end month, or is the
/// whole charge of a selection with no months.
pub fn quote(rental: &Rental, months: &[YearMonth], pending_penalty_cents: i64) -> Quote {
    let lines: Vec<MonthCharge> = months.iter().map(|m| month_charge(rental, *m)).collect();
    let rent_cents = lines.iter().map(|l| l.amount_cents).sum();

    let carries_penalty =
        months.is_empty() || rental.end_month().is_some_and(|end| months.contains(&end));
    let penalty_cents = if carries_penalty {
        pending_penalty_cents
    } else {
        0
    };

    Quote {
        months: months.to_vec(),
        lines,
        rent_cents,
        penalty_cents,
        total_cents: rent_cents + penalty_cents,
        currency: rental.currency.clone(),
    }
}
