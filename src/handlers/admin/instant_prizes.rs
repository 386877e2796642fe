use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, CreateInstantPrize, InstantPrize};
use crate::util::AuditLogBuilder;

use super::RaffleChildPath;

pub async fn create_instant_prize(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateInstantPrize>,
) -> Result<(StatusCode, Json<InstantPrize>)> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let raffle = queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;

    let prize = queries::create_instant_prize(&conn, &raffle, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::CreateInstantPrize)
        .resource("instant_prize", &prize.id)
        .details(&serde_json::json!({
            "raffle_id": raffle.id,
            "number_value": prize.number_value,
            "prize_description": prize.prize_description,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(prize)))
}

/// Full prize records, including who claimed them.
pub async fn list_instant_prizes(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
) -> Result<Json<Vec<InstantPrize>>> {
    let conn = state.db.get()?;
    queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    Ok(Json(queries::list_instant_prizes(&conn, &raffle_id)?))
}

pub async fn delete_instant_prize(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(path): Path<RaffleChildPath>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    if !queries::delete_instant_prize(&conn, &path.raffle_id, &path.id)? {
        return Err(AppError::NotFound(msg::INSTANT_PRIZE_NOT_FOUND.into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::DeleteInstantPrize)
        .resource("instant_prize", &path.id)
        .details(&serde_json::json!({ "raffle_id": path.raffle_id }))
        .save()?;

    Ok(StatusCode::NO_CONTENT)
}
