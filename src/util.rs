//! Request helpers, secret comparison and the audit log builder.

use axum::http::HeaderMap;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Compare a presented secret against the configured one in constant time.
///
/// Both sides are hashed first so the comparison length does not depend on input.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.ct_eq(&b).into()
}

/// Convert a provider decimal amount (e.g. `25.5`) to integer cents.
pub fn cents_from_decimal(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    Some((amount * 100.0).round() as i64)
}

/// Builder for audit log entries.
///
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .actor(ActorType::Admin, None)
///     .action(AuditAction::CreateRaffle)
///     .resource("raffle", &raffle.id)
///     .details(&serde_json::json!({ "title": raffle.title }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: Option<&'a HeaderMap>,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    action: Option<AuditAction>,
    resource_type: &'a str,
    resource_id: &'a str,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            headers: Some(headers),
            ..Self::system(conn, enabled)
        }
    }

    /// Entry with no originating request (background tasks).
    pub fn system(conn: &'a Connection, enabled: bool) -> Self {
        Self {
            conn,
            enabled,
            headers: None,
            actor_type: ActorType::System,
            actor_id: None,
            action: None,
            resource_type: "",
            resource_id: "",
            details: None,
        }
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<&'a str>) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Write the entry. Returns None when audit logging is disabled.
    pub fn save(self) -> Result<Option<AuditLog>> {
        let Some(action) = self.action else {
            return Err(crate::error::AppError::Internal(
                "audit log entry without an action".into(),
            ));
        };
        let (ip, ua) = self
            .headers
            .map(extract_request_info)
            .unwrap_or((None, None));
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            action,
            self.resource_type,
            self.resource_id,
            self.details,
            ip.as_deref(),
            ua.as_deref(),
        )
    }

    /// Write the entry, logging instead of failing the request.
    ///
    /// Used after the business write has committed, where an audit failure
    /// must not turn a completed sale into an error response.
    pub fn save_or_warn(self) {
        let resource_id = self.resource_id.to_string();
        if let Err(e) = self.save() {
            tracing::warn!(resource_id = %resource_id, "Failed to write audit log: {}", e);
        }
    }
}
