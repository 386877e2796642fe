use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::db::queries::PaymentReceipt;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::handlers::webhooks::common::spawn_purchase_email;
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, AuditAction, ConfirmationFilters, ConfirmationStatus, ConfirmationWithNumbers,
    InstantPrize, PurchaseConfirmation, SettleOutcome, Settlement,
};
use crate::util::AuditLogBuilder;

#[derive(Debug, Serialize)]
pub struct ConfirmationDetail {
    #[serde(flatten)]
    pub confirmation: ConfirmationWithNumbers,
    pub instant_prizes: Vec<InstantPrize>,
}

/// Body for settling a purchase by hand (bank transfer, cash).
#[derive(Debug, Deserialize)]
pub struct ManualConfirmRequest {
    #[serde(default)]
    pub amount_paid_cents: Option<i64>,
    /// Receipt or transfer number
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub confirmation_id: String,
    pub released: usize,
}

/// Audit a change that has already committed. Failures are logged, never returned.
fn audit_committed(
    state: &AppState,
    headers: &HeaderMap,
    ctx: &AdminContext,
    action: AuditAction,
    confirmation_id: &str,
    details: serde_json::Value,
) {
    match state.audit.get() {
        Ok(audit_conn) => AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers)
            .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
            .action(action)
            .resource("confirmation", confirmation_id)
            .details(&details)
            .save_or_warn(),
        Err(e) => tracing::warn!(confirmation_id = %confirmation_id, "Audit DB connection error: {}", e),
    }
}

pub async fn list_confirmations(
    State(state): State<AppState>,
    Query(filters): Query<ConfirmationFilters>,
) -> Result<Json<Vec<PurchaseConfirmation>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_confirmations(&conn, &filters)?))
}

pub async fn get_confirmation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConfirmationDetail>> {
    let conn = state.db.get()?;
    let confirmation = queries::get_confirmation_by_id(&conn, &id)?
        .or_not_found(msg::CONFIRMATION_NOT_FOUND)?;
    let instant_prizes = queries::list_instant_prizes_for_confirmation(&conn, &confirmation.id)?;
    Ok(Json(ConfirmationDetail {
        confirmation: queries::with_numbers(&conn, confirmation)?,
        instant_prizes,
    }))
}

/// Settle a pending purchase without a provider callback.
pub async fn confirm_purchase(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<ManualConfirmRequest>,
) -> Result<Json<Settlement>> {
    if let Some(amount) = input.amount_paid_cents
        && amount < 0
    {
        return Err(AppError::BadRequest("Amount cannot be negative".into()));
    }

    let mut conn = state.db.get()?;
    let receipt = PaymentReceipt {
        provider: None,
        reference: input
            .reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        amount_paid_cents: input.amount_paid_cents,
        event_id: None,
    };

    let settlement = match queries::settle_confirmation(&mut conn, &id, &receipt)? {
        SettleOutcome::Settled(settlement) => settlement,
        SettleOutcome::AlreadyResolved { status, .. } => {
            return Err(AppError::Conflict(format!(
                "Purchase is already {}",
                status.as_ref()
            )));
        }
    };

    tracing::info!(
        confirmation_id = %settlement.confirmation.id,
        numbers = settlement.numbers.len(),
        "Purchase confirmed by admin"
    );

    audit_committed(
        &state,
        &headers,
        &ctx,
        AuditAction::ConfirmPurchase,
        &settlement.confirmation.id,
        serde_json::json!({
            "raffle_id": settlement.confirmation.raffle_id,
            "numbers": settlement.numbers,
            "amount_paid_cents": settlement.confirmation.amount_paid_cents,
            "reference": settlement.confirmation.payment_reference,
        }),
    );

    spawn_purchase_email(&state, &settlement);

    Ok(Json(settlement))
}

pub async fn cancel_purchase(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PurchaseConfirmation>> {
    let conn = state.db.get()?;
    let confirmation = queries::get_confirmation_by_id(&conn, &id)?
        .or_not_found(msg::CONFIRMATION_NOT_FOUND)?;
    confirmation
        .status
        .ensure_transition(ConfirmationStatus::Cancelled)?;

    // A settlement can land between the read and the update
    if !queries::cancel_confirmation(&conn, &confirmation.id)? {
        return Err(AppError::Conflict(
            "Purchase was resolved while cancelling".into(),
        ));
    }

    let cancelled = queries::get_confirmation_by_id(&conn, &id)?
        .or_not_found(msg::CONFIRMATION_NOT_FOUND)?;

    audit_committed(
        &state,
        &headers,
        &ctx,
        AuditAction::CancelPurchase,
        &cancelled.id,
        serde_json::json!({ "raffle_id": cancelled.raffle_id }),
    );

    Ok(Json(cancelled))
}

/// Free the numbers of a paid purchase after an out-of-band refund.
pub async fn release_numbers(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ReleaseResponse>> {
    let mut conn = state.db.get()?;
    let released = queries::release_confirmation_numbers(&mut conn, &id)?;

    tracing::info!(confirmation_id = %id, released, "Numbers released");

    audit_committed(
        &state,
        &headers,
        &ctx,
        AuditAction::ReleaseNumbers,
        &id,
        serde_json::json!({ "released": released }),
    );

    Ok(Json(ReleaseResponse {
        confirmation_id: id,
        released,
    }))
}
