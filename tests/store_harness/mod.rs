//! Shared fixtures for storage backend testing
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod store_harness;
//! use store_harness::*;
//!
//! ledger_store_tests!(InMemoryStore::new());
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod ledger_store_tests;

use chrono::{NaiveDate, Utc};
use rentledger::core::month::YearMonth;
use rentledger::entities::{Listing, MonthCharge, Payment, PaymentStatus, Rental};
use uuid::Uuid;

pub const RENT: i64 = 120_000;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ym(s: &str) -> YearMonth {
    YearMonth::parse(s).unwrap()
}

pub fn listing() -> Listing {
    Listing::new(Uuid::new_v4(), "Loft over the bakery", RENT, "usd")
}

/// Active rental from 2024-01-01 on a fresh listing
pub fn rental() -> Rental {
    Rental::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        date(2024, 1, 1),
        RENT,
        "usd",
    )
}

/// Processing payment of full months, not yet stored
pub fn payment(rental: &Rental, months: &[&str]) -> Payment {
    let months: Vec<YearMonth> = months.iter().map(|m| ym(m)).collect();
    let lines: Vec<MonthCharge> = months
        .iter()
        .map(|m| MonthCharge {
            month: *m,
            amount_cents: rental.monthly_rent_cents,
            prorated: false,
        })
        .collect();
    let amount = rental.monthly_rent_cents * months.len() as i64;
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        rental_id: rental.id,
        tenant_id: rental.tenant_id,
        landlord_id: rental.landlord_id,
        months,
        lines,
        rent_cents: amount,
        penalty_cents: 0,
        amount_cents: amount,
        currency: rental.currency.clone(),
        status: PaymentStatus::Processing,
        intent_id: None,
        client_secret: None,
        failure_reason: None,
        created_at: now,
        updated_at: now,
        settled_at: None,
    }
}
