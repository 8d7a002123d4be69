//! Typed error handling for the rent ledger
//!
//! Every failure a handler can surface is a [`LedgerError`]. Each category
//! maps to an HTTP status and a stable `error_code` so API clients can branch
//! on the code instead of parsing messages.
//!
//! # Error Categories
//!
//! - [`MonthError`]: malformed or non-contiguous month selections
//! - [`RentalError`]: rental lookups and move-out rules
//! - [`PaymentError`]: checkout, month availability and provider failures
//! - [`WebhookError`]: provider webhook signature and payload problems
//! - [`ConfigError`]: configuration parsing and validation
//! - [`StorageError`]: storage backend failures
//! - [`RequestError`]: authentication, authorization and request bodies

use crate::core::month::{MonthError, YearMonth};
use crate::ledger::MonthStatus;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// The main error type for the ledger service
#[derive(Debug)]
pub enum LedgerError {
    /// Month parsing and selection errors
    Month(MonthError),

    /// Rental-related errors
    Rental(RentalError),

    /// Payment-related errors
    Payment(PaymentError),

    /// Webhook verification errors
    Webhook(WebhookError),

    /// Configuration errors
    Config(ConfigError),

    /// Storage backend errors
    Storage(StorageError),

    /// HTTP/Request errors
    Request(RequestError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Month(e) => write!(f, "{}", e),
            LedgerError::Rental(e) => write!(f, "{}", e),
            LedgerError::Payment(e) => write!(f, "{}", e),
            LedgerError::Webhook(e) => write!(f, "{}", e),
            LedgerError::Config(e) => write!(f, "{}", e),
            LedgerError::Storage(e) => write!(f, "{}", e),
            LedgerError::Request(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Month(e) => Some(e),
            LedgerError::Rental(e) => Some(e),
            LedgerError::Payment(e) => Some(e),
            LedgerError::Webhook(e) => Some(e),
            LedgerError::Config(e) => Some(e),
            LedgerError::Storage(e) => Some(e),
            LedgerError::Request(e) => Some(e),
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LedgerError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Month(_) => StatusCode::BAD_REQUEST,
            LedgerError::Rental(e) => e.status_code(),
            LedgerError::Payment(e) => e.status_code(),
            LedgerError::Webhook(_) => StatusCode::BAD_REQUEST,
            LedgerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Request(e) => e.status_code(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Month(e) => month_error_code(e),
            LedgerError::Rental(e) => e.error_code(),
            LedgerError::Payment(e) => e.error_code(),
            LedgerError::Webhook(e) => e.error_code(),
            LedgerError::Config(_) => "CONFIG_ERROR",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Request(e) => e.error_code(),
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            LedgerError::Month(MonthError::DuplicateMonth { month }) => {
                Some(serde_json::json!({ "month": month }))
            }
            LedgerError::Month(MonthError::NonContiguous { after, missing }) => {
                Some(serde_json::json!({ "after": after, "missing": missing }))
            }
            LedgerError::Payment(PaymentError::MonthUnavailable { month, status }) => {
                Some(serde_json::json!({ "month": month, "status": status }))
            }
            LedgerError::Payment(PaymentError::MustStartAt { expected, requested }) => {
                Some(serde_json::json!({ "expected": expected, "requested": requested }))
            }
            LedgerError::Payment(PaymentError::MonthsAlreadyClaimed { months }) => {
                Some(serde_json::json!({ "months": months }))
            }
            LedgerError::Request(RequestError::InvalidFields(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

fn month_error_code(err: &MonthError) -> &'static str {
    match err {
        MonthError::InvalidFormat { .. } => "INVALID_MONTH",
        MonthError::EmptySelection => "EMPTY_MONTH_SELECTION",
        MonthError::DuplicateMonth { .. } => "DUPLICATE_MONTH",
        MonthError::NonContiguous { .. } => "NON_CONTIGUOUS_MONTHS",
    }
}

impl From<MonthError> for LedgerError {
    fn from(err: MonthError) -> Self {
        LedgerError::Month(err)
    }
}

// =============================================================================
// Rental Errors
// =============================================================================

/// Errors related to rentals and move-out notices
#[derive(Debug)]
pub enum RentalError {
    /// Rental was not found
    NotFound { id: Uuid },

    /// Listing was not found
    ListingNotFound { id: Uuid },

    /// Tenant already has an active rental for this listing
    AlreadyActive { tenant_id: Uuid, listing_id: Uuid },

    /// Operation requires an active rental
    NotActive { id: Uuid },

    /// A move-out notice was already submitted
    MoveOutAlreadySubmitted { id: Uuid },

    /// The move-out dates are not acceptable
    InvalidMoveOut { message: String },

    /// Rent is already paid for a month after the requested move-out
    PaidBeyondMoveOut { month: YearMonth },
}

impl fmt::Display for RentalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RentalError::NotFound { id } => write!(f, "rental with id '{}' not found", id),
            RentalError::ListingNotFound { id } => {
                write!(f, "listing with id '{}' not found", id)
            }
            RentalError::AlreadyActive {
                tenant_id,
                listing_id,
            } => write!(
                f,
                "tenant '{}' already has an active rental for listing '{}'",
                tenant_id, listing_id
            ),
            RentalError::NotActive { id } => write!(f, "rental '{}' is not active", id),
            RentalError::MoveOutAlreadySubmitted { id } => {
                write!(f, "rental '{}' already has a move-out notice", id)
            }
            RentalError::InvalidMoveOut { message } => {
                write!(f, "Invalid move-out notice: {}", message)
            }
            RentalError::PaidBeyondMoveOut { month } => write!(
                f,
                "rent for {} is already paid or in progress; move-out must be on or after that month",
                month
            ),
        }
    }
}

impl std::error::Error for RentalError {}

impl RentalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RentalError::NotFound { .. } => StatusCode::NOT_FOUND,
            RentalError::ListingNotFound { .. } => StatusCode::NOT_FOUND,
            RentalError::AlreadyActive { .. } => StatusCode::CONFLICT,
            RentalError::NotActive { .. } => StatusCode::CONFLICT,
            RentalError::MoveOutAlreadySubmitted { .. } => StatusCode::CONFLICT,
            RentalError::InvalidMoveOut { .. } => StatusCode::BAD_REQUEST,
            RentalError::PaidBeyondMoveOut { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RentalError::NotFound { .. } => "RENTAL_NOT_FOUND",
            RentalError::ListingNotFound { .. } => "LISTING_NOT_FOUND",
            RentalError::AlreadyActive { .. } => "RENTAL_ALREADY_ACTIVE",
            RentalError::NotActive { .. } => "RENTAL_NOT_ACTIVE",
            RentalError::MoveOutAlreadySubmitted { .. } => "MOVE_OUT_ALREADY_SUBMITTED",
            RentalError::InvalidMoveOut { .. } => "INVALID_MOVE_OUT",
            RentalError::PaidBeyondMoveOut { .. } => "PAID_BEYOND_MOVE_OUT",
        }
    }
}

impl From<RentalError> for LedgerError {
    fn from(err: RentalError) -> Self {
        LedgerError::Rental(err)
    }
}

// =============================================================================
// Payment Errors
// =============================================================================

/// Errors related to payments
#[derive(Debug)]
pub enum PaymentError {
    /// Payment was not found
    NotFound { id: Uuid },

    /// A selected month cannot be paid
    MonthUnavailable { month: YearMonth, status: MonthStatus },

    /// A selected month is outside the rental's ledger
    MonthOutOfRange { month: YearMonth },

    /// The selection does not start at the earliest unpaid month
    MustStartAt {
        expected: YearMonth,
        requested: YearMonth,
    },

    /// Nothing is left to pay on this rental
    NothingPayable,

    /// Another payment claimed one of the months first
    MonthsAlreadyClaimed { months: Vec<YearMonth> },

    /// The payment provider failed
    Gateway { message: String },
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentError::NotFound { id } => write!(f, "payment with id '{}' not found", id),
            PaymentError::MonthUnavailable { month, status } => {
                write!(f, "month {} cannot be paid: it is {}", month, status)
            }
            PaymentError::MonthOutOfRange { month } => {
                write!(f, "month {} is outside this rental's payable range", month)
            }
            PaymentError::MustStartAt {
                expected,
                requested,
            } => write!(
                f,
                "payment must start at the earliest unpaid month {} (selection starts at {})",
                expected, requested
            ),
            PaymentError::NothingPayable => write!(f, "no months are currently payable"),
            PaymentError::MonthsAlreadyClaimed { months } => {
                let list: Vec<String> = months.iter().map(|m| m.to_string()).collect();
                write!(
                    f,
                    "months already claimed by another payment: {}",
                    list.join(", ")
                )
            }
            PaymentError::Gateway { message } => {
                write!(f, "Payment provider error: {}", message)
            }
        }
    }
}

impl std::error::Error for PaymentError {}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::NotFound { .. } => StatusCode::NOT_FOUND,
            PaymentError::MonthUnavailable { .. } => StatusCode::CONFLICT,
            PaymentError::MonthOutOfRange { .. } => StatusCode::BAD_REQUEST,
            PaymentError::MustStartAt { .. } => StatusCode::BAD_REQUEST,
            PaymentError::NothingPayable => StatusCode::CONFLICT,
            PaymentError::MonthsAlreadyClaimed { .. } => StatusCode::CONFLICT,
            PaymentError::Gateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::NotFound { .. } => "PAYMENT_NOT_FOUND",
            PaymentError::MonthUnavailable { .. } => "MONTH_UNAVAILABLE",
            PaymentError::MonthOutOfRange { .. } => "MONTH_OUT_OF_RANGE",
            PaymentError::MustStartAt { .. } => "MUST_START_AT_EARLIEST_UNPAID",
            PaymentError::NothingPayable => "NOTHING_PAYABLE",
            PaymentError::MonthsAlreadyClaimed { .. } => "MONTHS_ALREADY_CLAIMED",
            PaymentError::Gateway { .. } => "PAYMENT_PROVIDER_ERROR",
        }
    }
}

impl From<PaymentError> for LedgerError {
    fn from(err: PaymentError) -> Self {
        LedgerError::Payment(err)
    }
}

// =============================================================================
// Webhook Errors
// =============================================================================

/// Errors raised while authenticating or decoding a provider webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// No signature header was sent
    MissingSignature,

    /// The signature header could not be parsed
    MalformedSignature { message: String },

    /// No signature in the header matches the payload
    SignatureMismatch,

    /// The signed timestamp is outside the accepted tolerance
    TimestampOutOfTolerance { age_secs: i64 },

    /// The payload is not a valid event
    InvalidPayload { message: String },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookError::MissingSignature => write!(f, "Missing webhook signature header"),
            WebhookError::MalformedSignature { message } => {
                write!(f, "Malformed webhook signature header: {}", message)
            }
            WebhookError::SignatureMismatch => {
                write!(f, "Webhook signature does not match payload")
            }
            WebhookError::TimestampOutOfTolerance { age_secs } => write!(
                f,
                "Webhook timestamp outside tolerance ({}s old)",
                age_secs
            ),
            WebhookError::InvalidPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
        }
    }
}

impl std::error::Error for WebhookError {}

impl WebhookError {
    pub fn error_code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "WEBHOOK_SIGNATURE_MISSING",
            WebhookError::MalformedSignature { .. } => "WEBHOOK_SIGNATURE_MALFORMED",
            WebhookError::SignatureMismatch => "WEBHOOK_SIGNATURE_MISMATCH",
            WebhookError::TimestampOutOfTolerance { .. } => "WEBHOOK_TIMESTAMP_OUT_OF_TOLERANCE",
            WebhookError::InvalidPayload { .. } => "WEBHOOK_INVALID_PAYLOAD",
        }
    }
}

impl From<WebhookError> for LedgerError {
    fn from(err: WebhookError) -> Self {
        LedgerError::Webhook(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Missing required field in configuration
    MissingField { field: String, context: String },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::MissingField { field, context } => {
                write!(f, "Missing required field '{}' in {}", field, context)
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for LedgerError {
    fn from(err: ConfigError) -> Self {
        LedgerError::Config(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// Connection error
    ConnectionError { backend: String, message: String },

    /// Query execution error
    QueryError { backend: String, message: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionError { backend, message } => {
                write!(f, "Failed to connect to {}: {}", backend, message)
            }
            StorageError::QueryError { backend, message } => {
                write!(f, "{} query error: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        LedgerError::Storage(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// A single field validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// Request body failed field validation
    InvalidFields(Vec<FieldValidationError>),

    /// Invalid request body
    InvalidBody { message: String },

    /// Unauthorized request
    Unauthorized { message: String },

    /// Forbidden operation
    Forbidden { message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidFields(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            RequestError::Unauthorized { message } => {
                write!(f, "Unauthorized: {}", message)
            }
            RequestError::Forbidden { message } => {
                write!(f, "Forbidden: {}", message)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidFields(_) => "VALIDATION_ERROR",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

impl From<RequestError> for LedgerError {
    fn from(err: RequestError) -> Self {
        LedgerError::Request(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldValidationError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldValidationError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        LedgerError::Request(RequestError::InvalidFields(fields))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Request(RequestError::InvalidBody {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for LedgerError {
    fn from(err: serde_yaml::Error) -> Self {
        LedgerError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

/// Storage traits return `anyhow::Result`; anything that bubbles up from
/// them untyped is a backend failure.
impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StorageError>() {
            Ok(storage) => LedgerError::Storage(storage),
            Err(err) => LedgerError::Storage(StorageError::QueryError {
                backend: "store".to_string(),
                message: format!("{:#}", err),
            }),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        YearMonth::parse(s).unwrap()
    }

    #[test]
    fn test_month_errors_are_bad_requests() {
        let err: LedgerError = MonthError::NonContiguous {
            after: ym("2024-01"),
            missing: ym("2024-02"),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "NON_CONTIGUOUS_MONTHS");

        let response = err.to_response();
        let details = response.details.unwrap();
        assert_eq!(details["missing"], "2024-02");
    }

    #[test]
    fn test_rental_error_status_codes() {
        assert_eq!(
            RentalError::NotFound { id: Uuid::nil() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RentalError::AlreadyActive {
                tenant_id: Uuid::nil(),
                listing_id: Uuid::nil()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_payment_month_unavailable_details() {
        let err = LedgerError::Payment(PaymentError::MonthUnavailable {
            month: ym("2024-03"),
            status: MonthStatus::Paid,
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let details = err.to_response().details.unwrap();
        assert_eq!(details["month"], "2024-03");
        assert_eq!(details["status"], "paid");
    }

    #[test]
    fn test_gateway_error_is_bad_gateway() {
        let err = LedgerError::Payment(PaymentError::Gateway {
            message: "timeout".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_webhook_errors_are_bad_requests() {
        let err: LedgerError = WebhookError::SignatureMismatch.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "WEBHOOK_SIGNATURE_MISMATCH");
    }

    #[test]
    fn test_anyhow_maps_to_storage_error() {
        let err: LedgerError = anyhow::anyhow!("lock poisoned").into();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: LedgerError = json_err.into();
        assert!(matches!(
            err,
            LedgerError::Request(RequestError::InvalidBody { .. })
        ));
    }
}
