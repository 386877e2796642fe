use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, CreatePackage, Package};
use crate::util::AuditLogBuilder;

use super::RaffleChildPath;

pub async fn create_package(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreatePackage>,
) -> Result<(StatusCode, Json<Package>)> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let raffle = queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    input.validate(&raffle)?;

    let package = queries::create_package(&conn, &raffle.id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::CreatePackage)
        .resource("package", &package.id)
        .details(&serde_json::json!({
            "raffle_id": raffle.id,
            "quantity": package.quantity,
            "price_cents": package.price_cents,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn list_packages(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
) -> Result<Json<Vec<Package>>> {
    let conn = state.db.get()?;
    queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    Ok(Json(queries::list_packages(&conn, &raffle_id)?))
}

pub async fn delete_package(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(path): Path<RaffleChildPath>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    if !queries::delete_package(&conn, &path.raffle_id, &path.id)? {
        return Err(AppError::NotFound(msg::PACKAGE_NOT_FOUND.into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::DeletePackage)
        .resource("package", &path.id)
        .details(&serde_json::json!({ "raffle_id": path.raffle_id }))
        .save()?;

    Ok(StatusCode::NO_CONTENT)
}
