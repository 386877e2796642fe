use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{
    ActorType, AuditAction, ConfirmationWithNumbers, CreateConfirmation, NewPurchase,
    PaymentProvider, PurchaseConfirmation, Quote, Raffle, is_plausible_email,
};
use crate::util::AuditLogBuilder;

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    #[serde(flatten)]
    pub purchase: NewPurchase,
    /// `hotmart` (default) or `manual`; DataFast and PayPal have their own flows
    #[serde(default)]
    pub payment_provider: Option<PaymentProvider>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLookupQuery {
    pub email: String,
}

/// Validate a purchase against the raffle and price it.
///
/// Availability is checked here for early feedback only; numbers are
/// reserved at settlement time.
pub(crate) fn prepare_purchase(
    conn: &Connection,
    raffle_id: &str,
    purchase: &NewPurchase,
) -> Result<(Raffle, Quote)> {
    purchase.validate()?;

    let raffle = queries::get_raffle_by_id(conn, raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    if !raffle.is_accepting_purchases() {
        return Err(AppError::Conflict(msg::RAFFLE_NOT_ACTIVE.into()));
    }
    if purchase.quantity > raffle.available_numbers() {
        return Err(AppError::InsufficientNumbers {
            requested: purchase.quantity,
            available: raffle.available_numbers(),
        });
    }

    let packages = queries::list_packages(conn, &raffle.id)?;
    let quote = Quote::compute(&raffle, &packages, purchase.quantity)?;
    Ok((raffle, quote))
}

pub async fn create_purchase(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseConfirmation>)> {
    let provider = input.payment_provider.unwrap_or(PaymentProvider::Hotmart);
    if !matches!(provider, PaymentProvider::Hotmart | PaymentProvider::Manual) {
        return Err(AppError::BadRequest(format!(
            "Purchases paid with {} are created by their checkout flow",
            provider.as_ref()
        )));
    }

    let conn = state.db.get()?;
    let (raffle, quote) = prepare_purchase(&conn, &raffle_id, &input.purchase)?;

    let confirmation = queries::create_confirmation(
        &conn,
        &CreateConfirmation::from_purchase(
            &raffle.id,
            &input.purchase,
            quote.total_cents,
            &quote.currency,
            provider,
            None,
        ),
    )?;

    tracing::info!(
        confirmation_id = %confirmation.id,
        raffle_id = %raffle.id,
        quantity = confirmation.quantity,
        provider = provider.as_ref(),
        "Pending purchase created"
    );

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Public, None)
        .action(AuditAction::CreatePurchase)
        .resource("confirmation", &confirmation.id)
        .details(&serde_json::json!({
            "raffle_id": raffle.id,
            "quantity": confirmation.quantity,
            "total_cents": confirmation.total_cents,
            "provider": provider,
        }))
        .save_or_warn();

    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// A buyer's purchases and their numbers, looked up by email.
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchaseLookupQuery>,
) -> Result<Json<Vec<ConfirmationWithNumbers>>> {
    if !is_plausible_email(&query.email) {
        return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
    }
    let conn = state.db.get()?;
    Ok(Json(queries::list_purchases_by_email(&conn, &query.email)?))
}
