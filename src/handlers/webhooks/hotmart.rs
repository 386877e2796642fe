use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::models::{PaymentProvider, is_plausible_email, normalize_email};
use crate::payments::{HOTMART_HOTTOK_HEADER, HotmartEventKind, HotmartWebhook};
use crate::util::secrets_match;

use super::common::{
    CancelledPayment, ConfirmationTarget, ConfirmedPayment, PaymentEvent, WebhookProvider,
    WebhookResult, handle_webhook, reject,
};

pub struct HotmartProvider;

impl WebhookProvider for HotmartProvider {
    type Input = Bytes;

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Hotmart
    }

    fn authenticate(&self, state: &AppState, headers: &HeaderMap) -> Result<(), WebhookResult> {
        let Some(expected) = state.hotmart_hottok.as_deref() else {
            tracing::warn!("Hotmart webhook received but HOTMART_HOTTOK is not configured");
            return Err(reject(StatusCode::UNAUTHORIZED, "Hotmart webhook is not configured"));
        };
        let presented = headers
            .get(HOTMART_HOTTOK_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing hottok"))?;

        if !secrets_match(presented, expected) {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid hottok"));
        }
        Ok(())
    }

    async fn parse_event(&self, _state: &AppState, body: Bytes) -> Result<PaymentEvent, WebhookResult> {
        let hook: HotmartWebhook = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Failed to parse Hotmart webhook: {}", e);
            reject(StatusCode::BAD_REQUEST, "Invalid Hotmart payload")
        })?;

        let email = normalize_email(&hook.data.buyer.email);
        if !is_plausible_email(&email) {
            return Err(reject(StatusCode::BAD_REQUEST, "Invalid buyer email"));
        }
        let transaction = hook.data.purchase.transaction.trim().to_string();
        if transaction.is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, "Missing transaction id"));
        }

        let event = match hook.kind() {
            HotmartEventKind::Approved => PaymentEvent::Confirmed(ConfirmedPayment {
                event_id: hook.settlement_key(),
                reference: Some(transaction),
                amount_paid_cents: hook.amount_cents(),
                target: ConfirmationTarget::PendingByEmail {
                    email,
                    raffle_id: None,
                },
            }),
            HotmartEventKind::Cancelled => PaymentEvent::Cancelled(CancelledPayment {
                reference: Some(transaction),
                target: ConfirmationTarget::PendingByEmail {
                    email,
                    raffle_id: None,
                },
                reason: hook.event.clone(),
            }),
            HotmartEventKind::Other => PaymentEvent::Ignored(format!("event {}", hook.event)),
        };
        Ok(event)
    }
}

pub async fn handle_hotmart_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&HotmartProvider, &state, &headers, body).await
}
