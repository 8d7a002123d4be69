//! Route table

use super::handlers::{self, AppState};
use axum::{
    Router,
    routing::{get, post},
};

/// Build every route of the ledger API
///
/// - GET  /health, /healthz
/// - POST /api/listings, GET /api/listings/{id}
/// - POST /api/rentals, GET /api/rentals/{id}
/// - GET  /api/rentals/{id}/ledger
/// - POST /api/rentals/{id}/quote
/// - POST /api/rentals/{id}/payments (checkout), GET to list
/// - POST /api/rentals/{id}/move-out, POST /api/rentals/{id}/end
/// - GET  /api/payments/{id} (polls the provider while processing)
/// - POST /api/payments/webhook
/// - POST /api/admin/reconcile
/// - GET  /api/landlords/{id}/summary, GET /api/tenants/{id}/payments
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/api/listings", post(handlers::create_listing))
        .route("/api/listings/{id}", get(handlers::get_listing))
        .route("/api/rentals", post(handlers::create_rental))
        .route("/api/rentals/{id}", get(handlers::get_rental))
        .route("/api/rentals/{id}/ledger", get(handlers::get_ledger))
        .route("/api/rentals/{id}/quote", post(handlers::quote))
        .route(
            "/api/rentals/{id}/payments",
            post(handlers::checkout).get(handlers::list_rental_payments),
        )
        .route("/api/rentals/{id}/move-out", post(handlers::submit_move_out))
        .route("/api/rentals/{id}/end", post(handlers::end_rental))
        .route("/api/payments/webhook", post(handlers::payment_webhook))
        .route("/api/payments/{id}", get(handlers::get_payment))
        .route("/api/admin/reconcile", post(handlers::reconcile))
        .route("/api/landlords/{id}/summary", get(handlers::landlord_summary))
        .route("/api/tenants/{id}/payments", get(handlers::tenant_payments))
        .with_state(state)
}
