use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{ActorType, AuditAction, CreateConfirmation, NewPurchase, PaymentProvider};
use crate::util::AuditLogBuilder;

use super::purchases::prepare_purchase;

#[derive(Debug, Serialize)]
pub struct DataFastCheckoutResponse {
    pub confirmation_id: String,
    pub checkout_id: String,
    pub total_cents: i64,
    pub currency: String,
    /// Payment widget script for the checkout
    pub widget_url: String,
    /// Where the widget form should post back to
    pub result_url: String,
}

/// Create a pending purchase and a DataFast checkout for it.
pub async fn create_datafast_checkout(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
    headers: HeaderMap,
    Json(purchase): Json<NewPurchase>,
) -> Result<(StatusCode, Json<DataFastCheckoutResponse>)> {
    let Some(client) = state.datafast.clone() else {
        return Err(AppError::BadRequest(msg::DATAFAST_NOT_CONFIGURED.into()));
    };

    let confirmation = {
        let conn = state.db.get()?;
        let (raffle, quote) = prepare_purchase(&conn, &raffle_id, &purchase)?;
        queries::create_confirmation(
            &conn,
            &CreateConfirmation::from_purchase(
                &raffle.id,
                &purchase,
                quote.total_cents,
                &quote.currency,
                PaymentProvider::Datafast,
                None,
            ),
        )?
    };

    let checkout_id = match client
        .create_checkout(
            confirmation.total_cents,
            &confirmation.currency,
            &confirmation.id,
            &confirmation.buyer_email,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            // Nothing was charged; do not leave an orphaned pending purchase behind
            let conn = state.db.get()?;
            queries::cancel_confirmation(&conn, &confirmation.id)?;
            return Err(e);
        }
    };

    {
        let conn = state.db.get()?;
        queries::set_payment_reference(&conn, &confirmation.id, &checkout_id)?;
    }

    tracing::info!(
        confirmation_id = %confirmation.id,
        checkout_id = %checkout_id,
        "DataFast checkout created"
    );

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(ActorType::Public, None)
        .action(AuditAction::CreatePurchase)
        .resource("confirmation", &confirmation.id)
        .details(&serde_json::json!({
            "raffle_id": confirmation.raffle_id,
            "quantity": confirmation.quantity,
            "total_cents": confirmation.total_cents,
            "provider": "datafast",
            "checkout_id": checkout_id,
        }))
        .save_or_warn();

    Ok((
        StatusCode::CREATED,
        Json(DataFastCheckoutResponse {
            widget_url: client.widget_url(&checkout_id),
            result_url: format!("{}/webhooks/datafast", state.base_url.trim_end_matches('/')),
            confirmation_id: confirmation.id,
            checkout_id,
            total_cents: confirmation.total_cents,
            currency: confirmation.currency,
        }),
    ))
}
