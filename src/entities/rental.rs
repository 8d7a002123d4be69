//! Rental record and move-out notice

use crate::core::month::YearMonth;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Active,
    Ended,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant's notice to vacate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutNotice {
    /// Day the notice was given
    pub notice_date: NaiveDate,
    /// Last day of occupancy
    pub move_out_date: NaiveDate,
    /// Penalty owed for short notice, zero otherwise
    pub penalty_cents: i64,
    /// True when the notice was given with less lead time than required
    pub short_notice: bool,
}

impl MoveOutNotice {
    pub fn end_month(&self) -> YearMonth {
        YearMonth::from_date(self.move_out_date)
    }
}

/// A tenant's occupancy of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    /// First day of occupancy; the first month is prorated from here
    pub start_date: NaiveDate,
    pub monthly_rent_cents: i64,
    pub currency: String,
    pub status: RentalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_out: Option<MoveOutNotice>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rental {
    pub fn new(
        listing_id: Uuid,
        tenant_id: Uuid,
        landlord_id: Uuid,
        start_date: NaiveDate,
        monthly_rent_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            listing_id,
            tenant_id,
            landlord_id,
            start_date,
            monthly_rent_cents,
            currency: currency.into().to_lowercase(),
            status: RentalStatus::Active,
            move_out: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_month(&self) -> YearMonth {
        YearMonth::from_date(self.start_date)
    }

    /// Month of the move-out date, when a notice exists
    pub fn end_month(&self) -> Option<YearMonth> {
        self.move_out.as_ref().map(MoveOutNotice::end_month)
    }

    pub fn is_active(&self) -> bool {
        self.status == RentalStatus::Active
    }

    /// Update the updated_at timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
