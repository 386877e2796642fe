use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{AuditLog, AuditLogQuery};

#[derive(Debug, Serialize)]
pub struct AuditLogEntry {
    #[serde(flatten)]
    pub log: AuditLog,
    pub formatted: String,
}

/// Most recent audit entries, newest first.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    let conn = state.audit.get()?;
    let logs = queries::list_audit_logs(&conn, &query)?;
    Ok(Json(
        logs.into_iter()
            .map(|log| AuditLogEntry {
                formatted: log.formatted(),
                log,
            })
            .collect(),
    ))
}
