//! # rentledger
//!
//! Rent payment ledger for a rental marketplace.
//!
//! ## Features
//!
//! - **Month ledger**: every month of a rental is paid, processing, overdue,
//!   due, upcoming or blocked, derived from the rental and its payments
//! - **Contiguous checkout**: tenants pay one or more months at a time,
//!   always starting at the earliest unpaid month
//! - **Exclusive month claims**: a month is held by at most one live payment,
//!   even under concurrent checkouts
//! - **Move-out notices**: prorated final month and a short-notice penalty
//! - **Provider reconciliation**: Stripe webhooks, polling and a background
//!   sweep settle or release processing payments
//! - **Storage backends**: in-memory, or MongoDB behind `mongodb_backend`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rentledger::prelude::*;
//!
//! ServerBuilder::new()
//!     .with_config(AppConfig::load()?)
//!     .with_store(InMemoryStore::new())
//!     .with_gateway(MockGateway::new())
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod gateway;
pub mod ledger;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy, Role},
        clock::{Clock, FixedClock, SystemClock},
        error::{
            ConfigError, LedgerError, LedgerResult, PaymentError, RentalError, RequestError,
            StorageError, WebhookError,
        },
        events::{EventBus, EventEnvelope, LedgerEvent},
        month::{MonthError, YearMonth},
        store::{ClaimOutcome, LedgerStore, ListingStore, PaymentPatch, PaymentStore, RentalStore},
    };

    // === Domain ===
    pub use crate::entities::{
        Listing, MonthCharge, MoveOutNotice, Payment, PaymentStatus, Rental, RentalStatus,
    };
    pub use crate::ledger::{Ledger, LedgerEntry, MonthStatus, Quote};

    // === Payments ===
    pub use crate::gateway::{
        GatewayError, Intent, IntentRequest, IntentStatus, MockGateway, PaymentGateway,
        StripeGateway, WebhookVerifier,
    };

    // === Service ===
    pub use crate::service::{
        CheckoutReceipt, LandlordSummary, LedgerService, MonthSelection, MoveOutRequest,
        NewListing, NewRental, ReconcileReport, WebhookAck, WebhookAction,
    };

    // === Storage ===
    pub use crate::storage::InMemoryStore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoStore;

    // === Config ===
    pub use crate::config::{
        AppConfig, LedgerConfig, PaymentProvider, PaymentsConfig, ReconcileConfig, ServerConfig,
        StorageBackend, StorageConfig,
    };

    // === Server ===
    pub use crate::server::{AppState, ServerBuilder};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, NaiveDate, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;
}
