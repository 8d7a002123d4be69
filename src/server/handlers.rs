//! HTTP handlers
//!
//! Handlers decode the request, call the matching [`LedgerService`]
//! operation and encode its result. Access rules live in the service.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::core::auth::{AuthContext, AuthPolicy};
use crate::core::error::{LedgerResult, RequestError};
use crate::gateway::webhook::SIGNATURE_HEADER;
use crate::service::{LedgerService, MonthSelection, MoveOutRequest, NewListing, NewRental};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: LedgerService,
}

/// Unwrap a JSON body, reporting syntax and shape errors in the API's format
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> LedgerResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        RequestError::InvalidBody {
            message: rejection.body_text(),
        }
        .into()
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "rentledger",
        "provider": state.service.gateway_name(),
    }))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

pub async fn create_listing(
    State(state): State<AppState>,
    actor: AuthContext,
    payload: Result<Json<NewListing>, JsonRejection>,
) -> LedgerResult<Response> {
    let listing = state.service.create_listing(&actor, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(listing)).into_response())
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.get_listing(id).await?).into_response())
}

// ---------------------------------------------------------------------------
// Rentals
// ---------------------------------------------------------------------------

pub async fn create_rental(
    State(state): State<AppState>,
    actor: AuthContext,
    payload: Result<Json<NewRental>, JsonRejection>,
) -> LedgerResult<Response> {
    let rental = state.service.create_rental(&actor, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(rental)).into_response())
}

pub async fn get_rental(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.get_rental(&actor, id).await?).into_response())
}

pub async fn get_ledger(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.ledger(&actor, id).await?).into_response())
}

pub async fn quote(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<MonthSelection>, JsonRejection>,
) -> LedgerResult<Response> {
    let months = body(payload)?.parse()?;
    Ok(Json(state.service.quote(&actor, id, &months).await?).into_response())
}

pub async fn submit_move_out(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<MoveOutRequest>, JsonRejection>,
) -> LedgerResult<Response> {
    let rental = state
        .service
        .submit_move_out(&actor, id, body(payload)?)
        .await?;
    Ok(Json(rental).into_response())
}

pub async fn end_rental(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.end_rental(&actor, id).await?).into_response())
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

pub async fn checkout(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<MonthSelection>, JsonRejection>,
) -> LedgerResult<Response> {
    let months = body(payload)?.parse()?;
    let receipt = state.service.checkout(&actor, id, &months).await?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub async fn list_rental_payments(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    let payments = state.service.rental_payments(&actor, id).await?;
    Ok(Json(json!({ "count": payments.len(), "payments": payments })).into_response())
}

pub async fn get_payment(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.poll_payment(&actor, id).await?).into_response())
}

/// Provider webhook; the raw body is needed to check the signature
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> LedgerResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ack = state.service.handle_webhook(&payload, signature).await?;
    Ok(Json(ack).into_response())
}

pub async fn reconcile(
    State(state): State<AppState>,
    actor: AuthContext,
) -> LedgerResult<Response> {
    actor.require(&AuthPolicy::AdminOnly)?;
    Ok(Json(state.service.reconcile_processing().await?).into_response())
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

pub async fn landlord_summary(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    Ok(Json(state.service.landlord_summary(&actor, id).await?).into_response())
}

pub async fn tenant_payments(
    State(state): State<AppState>,
    actor: AuthContext,
    Path(id): Path<Uuid>,
) -> LedgerResult<Response> {
    let payments = state.service.tenant_payments(&actor, id).await?;
    Ok(Json(json!({ "count": payments.len(), "payments": payments })).into_response())
}
