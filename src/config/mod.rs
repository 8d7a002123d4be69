//! Configuration loading and management
//!
//! Configuration comes from an optional YAML file (path in
//! `RENTLEDGER_CONFIG`), then environment overrides for deployment secrets.
//! Every section has defaults, so an empty file is a valid configuration.

use crate::core::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. "0.0.0.0:8080"
    pub bind: String,

    /// Buffer size of the ledger event bus
    pub event_bus_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            event_bus_capacity: 1024,
        }
    }
}

/// Ten years; the ledger horizon is built month by month up to this bound
pub const MAX_PREPAY_MONTHS: u32 = 120;

/// Business rules for month accounting and move-out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Minimum days between notice and move-out to avoid the penalty
    pub notice_days: i64,

    /// Short-notice penalty as a percentage of monthly rent
    pub penalty_percent: u32,

    /// How many months past the current one a tenant may prepay
    pub max_prepay_months: u32,

    /// Currency used when a listing does not name one
    pub default_currency: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            notice_days: 30,
            penalty_percent: 100,
            max_prepay_months: 6,
            default_currency: "usd".to_string(),
        }
    }
}

/// Which payment provider backs checkouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// In-process provider for development and tests
    Mock,
    Stripe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub provider: PaymentProvider,

    /// Stripe secret API key (`sk_...`)
    pub stripe_secret_key: Option<String>,

    /// Base URL of the Stripe API
    pub stripe_api_base: String,

    /// Signing secret for incoming webhooks (`whsec_...`)
    pub webhook_secret: String,

    /// Maximum accepted age of a webhook signature timestamp
    pub webhook_tolerance_secs: i64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: PaymentProvider::Mock,
            stripe_secret_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    InMemory,
    Mongodb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb_uri: String,
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::InMemory,
            mongodb_uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "rentledger".to_string(),
        }
    }
}

/// Background reconciliation of payments stuck in processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between sweeps; 0 disables the background reconciler
    pub interval_secs: u64,

    /// Only payments processing for at least this long are polled
    pub min_age_secs: i64,

    /// Checkouts still awaiting the payer after this long are canceled
    pub abandon_after_secs: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            min_age_secs: 120,
            abandon_after_secs: 86_400,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub payments: PaymentsConfig,
    pub storage: StorageConfig,
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path, e),
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.to_string()),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// File named by `RENTLEDGER_CONFIG` (defaults otherwise) plus environment overrides
    pub fn load() -> Result<Self> {
        let config = match std::env::var("RENTLEDGER_CONFIG") {
            Ok(path) => {
                tracing::info!("Loading configuration from {}", path);
                Self::from_yaml_file(&path)?
            }
            Err(_) => {
                tracing::info!("RENTLEDGER_CONFIG not set, using default configuration");
                Self::default()
            }
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("RENTLEDGER_BIND") {
            self.server.bind = bind;
        }
        if let Some(key) = lookup("STRIPE_SECRET_KEY") {
            self.payments.stripe_secret_key = Some(key);
            self.payments.provider = PaymentProvider::Stripe;
        }
        if let Some(secret) = lookup("STRIPE_WEBHOOK_SECRET") {
            self.payments.webhook_secret = secret;
        }
        if let Some(uri) = lookup("MONGODB_URI") {
            self.storage.mongodb_uri = uri;
            self.storage.backend = StorageBackend::Mongodb;
        }
        if let Some(db) = lookup("MONGODB_DATABASE") {
            self.storage.database = db;
        }
        if let Some(raw) = lookup("RENTLEDGER_RECONCILE_INTERVAL_SECS") {
            match raw.parse() {
                Ok(secs) => self.reconcile.interval_secs = secs,
                Err(e) => tracing::warn!("Ignoring RENTLEDGER_RECONCILE_INTERVAL_SECS={}: {}", raw, e),
            }
        }
        self
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "bind".to_string(),
                context: "server".to_string(),
            });
        }
        if self.ledger.notice_days < 0 {
            return Err(ConfigError::InvalidValue {
                field: "notice_days".to_string(),
                value: self.ledger.notice_days.to_string(),
                message: "must not be negative".to_string(),
            });
        }
        if self.ledger.penalty_percent > 1000 {
            return Err(ConfigError::InvalidValue {
                field: "penalty_percent".to_string(),
                value: self.ledger.penalty_percent.to_string(),
                message: "must be at most 1000".to_string(),
            });
        }
        if self.ledger.max_prepay_months > MAX_PREPAY_MONTHS {
            return Err(ConfigError::InvalidValue {
                field: "max_prepay_months".to_string(),
                value: self.ledger.max_prepay_months.to_string(),
                message: format!("must be at most {}", MAX_PREPAY_MONTHS),
            });
        }
        if self.payments.webhook_tolerance_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "webhook_tolerance_secs".to_string(),
                value: self.payments.webhook_tolerance_secs.to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.payments.provider == PaymentProvider::Stripe {
            if self.payments.stripe_secret_key.is_none() {
                return Err(ConfigError::MissingField {
                    field: "stripe_secret_key".to_string(),
                    context: "payments".to_string(),
                });
            }
            if self.payments.webhook_secret.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "webhook_secret".to_string(),
                    context: "payments".to_string(),
                });
            }
        }
        Ok(())
    }
}
