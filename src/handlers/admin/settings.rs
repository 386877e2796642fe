use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, SiteSettings, UpdateSiteSettings};
use crate::util::AuditLogBuilder;

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>> {
    let conn = state.db.get()?;
    Ok(Json(queries::get_settings(&conn)?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<UpdateSiteSettings>,
) -> Result<Json<SiteSettings>> {
    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let settings = queries::update_settings(&conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Admin, Some(&ctx.key_fingerprint))
        .action(AuditAction::UpdateSettings)
        .resource("settings", "site")
        .details(&serde_json::json!({
            "site_name": input.site_name,
            "email_enabled": input.email_enabled,
        }))
        .save()?;

    Ok(Json(settings))
}
