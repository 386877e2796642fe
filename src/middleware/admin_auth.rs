use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::db::AppState;
use crate::util::{extract_bearer_token, secrets_match};

/// Inserted into request extensions once the admin key has been verified.
#[derive(Debug, Clone)]
pub struct AdminContext {
    /// Short fingerprint of the key used, recorded as the audit actor
    pub key_fingerprint: String,
}

fn fingerprint(key: &str) -> String {
    Sha256::digest(key.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<AdminContext, StatusCode> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        tracing::warn!("Admin request rejected: ADMIN_API_KEY is not configured");
        return Err(StatusCode::UNAUTHORIZED);
    };
    let token = extract_bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;

    if !secrets_match(token, expected) {
        tracing::debug!("Admin request rejected: key mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(AdminContext {
        key_fingerprint: fingerprint(token),
    })
}

pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let ctx = authenticate_admin(&state, request.headers())?;
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
