use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::db::AppState;
use crate::models::{NewPurchase, PaymentProvider};
use crate::util::cents_from_decimal;

use super::common::{
    ConfirmationTarget, ConfirmedPayment, PaymentEvent, WebhookProvider, WebhookResult,
    error_result, handle_webhook, reject,
};

/// Posted by the storefront after the PayPal button captures an order.
#[derive(Debug, Deserialize)]
pub struct PayPalConfirmationRequest {
    pub raffle_id: String,
    pub quantity: i64,
    /// Amount the buyer was charged, as a decimal
    pub total_amount: f64,
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    pub paypal_order_id: String,
}

pub struct PayPalProvider;

impl WebhookProvider for PayPalProvider {
    type Input = Bytes;

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    async fn parse_event(&self, state: &AppState, body: Bytes) -> Result<PaymentEvent, WebhookResult> {
        let request: PayPalConfirmationRequest = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Invalid PayPal confirmation body: {}", e);
            reject(StatusCode::BAD_REQUEST, &format!("Invalid request body: {}", e))
        })?;

        let order_id = request.paypal_order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, "paypal_order_id is required"));
        }

        let mut amount_paid_cents = cents_from_decimal(request.total_amount);

        if let Some(client) = state.paypal.as_ref() {
            let order = client.get_order(&order_id).await.map_err(error_result)?;
            if !order.is_completed() {
                tracing::warn!(order_id = %order_id, status = %order.status, "PayPal order not completed");
                return Err(reject(StatusCode::BAD_REQUEST, "PayPal order is not completed"));
            }
            if let Some(captured) = order.captured_cents() {
                if Some(captured) != amount_paid_cents {
                    tracing::warn!(
                        order_id = %order_id,
                        reported_cents = ?amount_paid_cents,
                        captured_cents = captured,
                        "Reported PayPal amount differs from captured amount"
                    );
                }
                amount_paid_cents = Some(captured);
            }
        } else {
            tracing::debug!(order_id = %order_id, "PayPal credentials not configured, order not verified");
        }

        Ok(PaymentEvent::Confirmed(ConfirmedPayment {
            event_id: order_id.clone(),
            reference: Some(order_id),
            amount_paid_cents,
            target: ConfirmationTarget::Create {
                raffle_id: request.raffle_id,
                purchase: NewPurchase {
                    buyer_name: request.buyer_name,
                    buyer_email: request.buyer_email,
                    buyer_phone: request.buyer_phone,
                    quantity: request.quantity,
                },
            },
        }))
    }
}

pub async fn handle_paypal_confirmation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&PayPalProvider, &state, &headers, body).await
}
