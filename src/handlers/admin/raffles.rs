use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{
    ActorType, AuditAction, CreateRaffle, RaffleStatus, RaffleView, UpdateRaffle,
    UpdateRaffleStatus,
};
use crate::util::AuditLogBuilder;

#[derive(Debug, Default, Deserialize)]
pub struct RaffleListQuery {
    pub status: Option<RaffleStatus>,
}

pub async fn create_raffle(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateRaffle>,
) -> Result<(StatusCode, Json<RaffleView>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let raffle = queries::create_raffle(&conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::CreateRaffle)
        .resource("raffle", &raffle.id)
        .details(&serde_json::json!({
            "title": raffle.title,
            "total_numbers": raffle.total_numbers,
            "price_per_number_cents": raffle.price_per_number_cents,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(raffle.into())))
}

/// All raffles, including drafts and closed ones.
pub async fn list_raffles(
    State(state): State<AppState>,
    Query(query): Query<RaffleListQuery>,
) -> Result<Json<Vec<RaffleView>>> {
    let conn = state.db.get()?;
    let raffles = queries::list_raffles(&conn, query.status)?;
    Ok(Json(raffles.into_iter().map(RaffleView::from).collect()))
}

pub async fn get_raffle(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
) -> Result<Json<RaffleView>> {
    let conn = state.db.get()?;
    let raffle = queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    Ok(Json(raffle.into()))
}

pub async fn update_raffle(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateRaffle>,
) -> Result<Json<RaffleView>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let raffle = queries::update_raffle(&conn, &raffle_id, &input)?
        .or_not_found(msg::RAFFLE_NOT_FOUND)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::UpdateRaffle)
        .resource("raffle", &raffle.id)
        .details(&serde_json::json!({
            "title": input.title,
            "total_numbers": input.total_numbers,
            "price_per_number_cents": input.price_per_number_cents,
            "currency": input.currency,
        }))
        .save()?;

    Ok(Json(raffle.into()))
}

pub async fn change_raffle_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateRaffleStatus>,
) -> Result<Json<RaffleView>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let raffle = queries::set_raffle_status(&conn, &raffle_id, input.status)?
        .or_not_found(msg::RAFFLE_NOT_FOUND)?;

    tracing::info!(raffle_id = %raffle.id, status = raffle.status.as_ref(), "Raffle status changed");

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::ChangeRaffleStatus)
        .resource("raffle", &raffle.id)
        .details(&serde_json::json!({ "status": raffle.status }))
        .save()?;

    Ok(Json(raffle.into()))
}

pub async fn delete_raffle(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    if !queries::delete_raffle(&conn, &raffle_id)? {
        return Err(AppError::NotFound(msg::RAFFLE_NOT_FOUND.into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::DeleteRaffle)
        .resource("raffle", &raffle_id)
        .save()?;

    Ok(StatusCode::NO_CONTENT)
}
