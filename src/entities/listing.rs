//! Listing record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A property offered for rent by a landlord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub title: String,
    /// Asking rent in minor currency units
    pub monthly_rent_cents: i64,
    /// ISO 4217 code, lowercase (`"usd"`)
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(
        landlord_id: Uuid,
        title: impl Into<String>,
        monthly_rent_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            landlord_id,
            title: title.into(),
            monthly_rent_cents,
            currency: currency.into().to_lowercase(),
            created_at: Utc::now(),
        }
    }
}
