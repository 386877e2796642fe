use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::db::AppState;
use crate::error::msg;
use crate::extractors::Query;
use crate::models::PaymentProvider;
use crate::payments::{ResultCodeClass, classify_result_code};

use super::common::{
    CancelledPayment, ConfirmationTarget, ConfirmedPayment, PaymentEvent, WebhookProvider,
    WebhookResult, error_result, handle_webhook, reject,
};

#[derive(Debug, Deserialize)]
pub struct DataFastCallbackQuery {
    /// Checkout id
    pub id: String,
    #[serde(rename = "resourcePath", default)]
    pub resource_path: Option<String>,
}

pub struct DataFastProvider;

impl WebhookProvider for DataFastProvider {
    /// Checkout id from the redirect
    type Input = String;

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Datafast
    }

    async fn parse_event(&self, state: &AppState, checkout_id: String) -> Result<PaymentEvent, WebhookResult> {
        let Some(client) = state.datafast.as_ref() else {
            return Err(reject(StatusCode::SERVICE_UNAVAILABLE, msg::DATAFAST_NOT_CONFIGURED));
        };
        if checkout_id.trim().is_empty() {
            return Err(reject(StatusCode::BAD_REQUEST, "Missing checkout id"));
        }

        let status = client
            .get_payment_status(&checkout_id)
            .await
            .map_err(error_result)?;
        let code = status.result.code.clone();

        let event = match classify_result_code(&code) {
            ResultCodeClass::Success => PaymentEvent::Confirmed(ConfirmedPayment {
                event_id: checkout_id.clone(),
                reference: Some(checkout_id.clone()),
                amount_paid_cents: status.amount_cents(),
                target: ConfirmationTarget::ByReference(checkout_id),
            }),
            ResultCodeClass::Pending => PaymentEvent::Ignored(format!("payment pending ({})", code)),
            ResultCodeClass::Rejected => PaymentEvent::Cancelled(CancelledPayment {
                reference: Some(checkout_id.clone()),
                target: ConfirmationTarget::ByReference(checkout_id),
                reason: format!("{} {}", code, status.result.description),
            }),
        };
        Ok(event)
    }
}

pub async fn handle_datafast_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DataFastCallbackQuery>,
) -> impl IntoResponse {
    if let Some(ref path) = query.resource_path {
        tracing::debug!(resource_path = %path, "DataFast callback");
    }
    handle_webhook(&DataFastProvider, &state, &headers, query.id).await
}
