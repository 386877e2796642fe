//! Payment reconciliation shared by the Hotmart, PayPal and DataFast webhooks.
//!
//! Providers only authenticate and translate their payload into a
//! [`PaymentEvent`]; locating the purchase, settling it and notifying the
//! buyer happen here, through the same settlement path for every provider.

use std::future::Future;

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::db::queries::SettleTarget;
use crate::db::{AppState, queries};
use crate::email::PurchaseEmail;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::handlers::public::prepare_purchase;
use crate::models::{
    ActorType, AuditAction, ConfirmationStatus, CreateConfirmation, NewPurchase, PaymentProvider,
    PublicInstantPrize, PurchaseConfirmation, SettleOutcome, Settlement,
};
use crate::util::AuditLogBuilder;

/// Status code and JSON body returned to the provider.
pub type WebhookResult = (StatusCode, Json<Value>);

pub fn reject(status: StatusCode, message: &str) -> WebhookResult {
    (status, Json(json!({ "status": "error", "error": message })))
}

/// Map an error to a webhook response without leaking internals.
pub fn error_result(err: AppError) -> WebhookResult {
    let status = err.status();
    let message = match &err {
        AppError::NotFound(m) | AppError::BadRequest(m) | AppError::Conflict(m) => m.clone(),
        AppError::InsufficientNumbers { .. } => err.to_string(),
        AppError::Upstream(m) => {
            tracing::error!("Payment provider error during webhook: {}", m);
            "Payment provider error".to_string()
        }
        _ => {
            tracing::error!("Webhook processing failed: {}", err);
            "Internal error".to_string()
        }
    };
    reject(status, &message)
}

/// How to find the purchase a payment belongs to.
#[derive(Debug)]
pub enum ConfirmationTarget {
    /// Most recent pending purchase for this buyer
    PendingByEmail {
        email: String,
        raffle_id: Option<String>,
    },
    /// The provider reports the whole order; create the purchase here
    Create {
        raffle_id: String,
        purchase: NewPurchase,
    },
    /// Purchase whose payment reference is this provider id
    ByReference(String),
}

#[derive(Debug)]
pub struct ConfirmedPayment {
    /// Replay key for `webhook_events`
    pub event_id: String,
    /// Provider transaction id; a purchase already carrying it wins over `target`
    pub reference: Option<String>,
    pub amount_paid_cents: Option<i64>,
    pub target: ConfirmationTarget,
}

#[derive(Debug)]
pub struct CancelledPayment {
    pub reference: Option<String>,
    pub target: ConfirmationTarget,
    pub reason: String,
}

#[derive(Debug)]
pub enum PaymentEvent {
    Confirmed(ConfirmedPayment),
    Cancelled(CancelledPayment),
    /// Not relevant to ticket allocation (reason is logged)
    Ignored(String),
}

/// Per-provider webhook behaviour.
pub trait WebhookProvider: Send + Sync {
    /// Raw request data the provider needs (body bytes, query id, ...)
    type Input: Send;

    fn provider(&self) -> PaymentProvider;

    fn authenticate(&self, _state: &AppState, _headers: &HeaderMap) -> std::result::Result<(), WebhookResult> {
        Ok(())
    }

    /// Translate the request into a provider-agnostic event. May call the provider's API.
    fn parse_event(
        &self,
        state: &AppState,
        input: Self::Input,
    ) -> impl Future<Output = std::result::Result<PaymentEvent, WebhookResult>> + Send;
}

pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: &HeaderMap,
    input: P::Input,
) -> WebhookResult {
    if let Err(rejection) = provider.authenticate(state, headers) {
        tracing::warn!(provider = provider.provider().as_ref(), "Webhook authentication failed");
        return rejection;
    }

    let event = match provider.parse_event(state, input).await {
        Ok(event) => event,
        Err(rejection) => return rejection,
    };

    let result = match event {
        PaymentEvent::Confirmed(payment) => {
            process_confirmed(provider.provider(), state, headers, payment)
        }
        PaymentEvent::Cancelled(cancel) => {
            process_cancelled(provider.provider(), state, headers, cancel)
        }
        PaymentEvent::Ignored(reason) => {
            tracing::debug!(provider = provider.provider().as_ref(), reason = %reason, "Webhook event ignored");
            Ok((
                StatusCode::OK,
                Json(json!({ "status": "ignored", "reason": reason })),
            ))
        }
    };
    result.unwrap_or_else(error_result)
}

/// Create the purchase for providers that report the full order (PayPal).
fn create_for_payment(
    conn: &Connection,
    provider: PaymentProvider,
    raffle_id: &str,
    purchase: &NewPurchase,
    reference: Option<String>,
) -> Result<PurchaseConfirmation> {
    let (raffle, quote) = prepare_purchase(conn, raffle_id, purchase)?;

    let input = CreateConfirmation::from_purchase(
        &raffle.id,
        purchase,
        quote.total_cents,
        &raffle.currency,
        provider,
        reference.clone(),
    );
    match queries::create_confirmation(conn, &input) {
        Ok(confirmation) => Ok(confirmation),
        // A concurrent delivery created it first
        Err(AppError::Database(rusqlite::Error::SqliteFailure(err, _)))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let reference = reference.unwrap_or_default();
            queries::get_confirmation_by_reference(conn, provider, &reference)?
                .or_not_found(msg::CONFIRMATION_NOT_FOUND)
        }
        Err(e) => Err(e),
    }
}

/// Purchase already carrying this payment's provider reference (redeliveries).
fn find_by_payment_reference(
    conn: &Connection,
    provider: PaymentProvider,
    payment: &ConfirmedPayment,
) -> Result<Option<PurchaseConfirmation>> {
    match payment.reference.as_deref() {
        Some(reference) => queries::get_confirmation_by_reference(conn, provider, reference),
        None => Ok(None),
    }
}

fn process_confirmed(
    provider: PaymentProvider,
    state: &AppState,
    headers: &HeaderMap,
    payment: ConfirmedPayment,
) -> Result<WebhookResult> {
    let mut conn = state.db.get()?;

    let receipt = queries::PaymentReceipt {
        provider: Some(provider),
        reference: payment.reference.clone(),
        amount_paid_cents: payment.amount_paid_cents,
        event_id: Some(payment.event_id.clone()),
    };

    // Email matches are picked under the settlement's write lock, so two
    // payments from one buyer never land on the same pending purchase.
    let settled = match &payment.target {
        ConfirmationTarget::PendingByEmail { email, raffle_id } => queries::settle_target(
            &mut conn,
            SettleTarget::LatestPendingByEmail {
                email: email.as_str(),
                raffle_id: raffle_id.as_deref(),
            },
            &receipt,
        ),
        ConfirmationTarget::ByReference(reference) => {
            let confirmation = match find_by_payment_reference(&conn, provider, &payment)? {
                Some(existing) => existing,
                None => queries::get_confirmation_by_reference(&conn, provider, reference)?
                    .or_not_found(msg::NO_PENDING_PURCHASE)?,
            };
            queries::settle_confirmation(&mut conn, &confirmation.id, &receipt)
        }
        ConfirmationTarget::Create {
            raffle_id,
            purchase,
        } => {
            let confirmation = match find_by_payment_reference(&conn, provider, &payment)? {
                Some(existing) => existing,
                None => create_for_payment(
                    &conn,
                    provider,
                    raffle_id,
                    purchase,
                    payment.reference.clone(),
                )?,
            };
            queries::settle_confirmation(&mut conn, &confirmation.id, &receipt)
        }
    };

    let outcome = match settled {
        Ok(outcome) => outcome,
        Err(e @ AppError::InsufficientNumbers { .. }) => {
            tracing::warn!(
                provider = provider.as_ref(),
                event_id = %payment.event_id,
                "Paid purchase could not be allocated: {}",
                e
            );
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    match outcome {
        SettleOutcome::AlreadyResolved {
            confirmation_id,
            status,
        } => {
            tracing::info!(
                provider = provider.as_ref(),
                confirmation_id = %confirmation_id,
                status = status.as_ref(),
                "Payment already reconciled"
            );
            Ok((
                StatusCode::OK,
                Json(json!({
                    "status": "already_processed",
                    "confirmation_id": confirmation_id,
                    "purchase_status": status,
                })),
            ))
        }
        SettleOutcome::Settled(settlement) => {
            let settled = &settlement.confirmation;
            if let Some(paid) = settled.amount_paid_cents
                && paid != settled.total_cents
            {
                tracing::warn!(
                    provider = provider.as_ref(),
                    confirmation_id = %settled.id,
                    expected_cents = settled.total_cents,
                    paid_cents = paid,
                    "Paid amount differs from quoted total"
                );
            }

            audit_webhook(
                state,
                headers,
                provider,
                AuditAction::ReceivePaymentWebhook,
                &settled.id,
                json!({
                    "event_id": payment.event_id,
                    "reference": settled.payment_reference,
                    "quantity": settled.quantity,
                    "amount_paid_cents": settled.amount_paid_cents,
                    "instant_prizes": settlement.instant_prizes.len(),
                }),
            );
            spawn_purchase_email(state, &settlement);
            Ok(settled_response(&settlement))
        }
    }
}

fn process_cancelled(
    provider: PaymentProvider,
    state: &AppState,
    headers: &HeaderMap,
    cancel: CancelledPayment,
) -> Result<WebhookResult> {
    let conn = state.db.get()?;

    let by_reference = match cancel.reference.as_deref() {
        Some(reference) => queries::get_confirmation_by_reference(&conn, provider, reference)?,
        None => None,
    };
    let confirmation = match by_reference {
        Some(c) => Some(c),
        None => match &cancel.target {
            ConfirmationTarget::PendingByEmail { email, raffle_id } => {
                queries::find_latest_pending_by_email(&conn, email, raffle_id.as_deref())?
            }
            ConfirmationTarget::ByReference(reference) => {
                queries::get_confirmation_by_reference(&conn, provider, reference)?
            }
            ConfirmationTarget::Create { .. } => None,
        },
    };

    let Some(confirmation) = confirmation else {
        tracing::info!(provider = provider.as_ref(), reason = %cancel.reason, "Cancellation with no matching purchase");
        return Ok((
            StatusCode::OK,
            Json(json!({ "status": "ignored", "reason": "no matching purchase" })),
        ));
    };

    if confirmation.status == ConfirmationStatus::Paid {
        tracing::warn!(
            provider = provider.as_ref(),
            confirmation_id = %confirmation.id,
            reason = %cancel.reason,
            "Cancellation received for a paid purchase; numbers kept, release manually if refunded"
        );
        return Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ignored",
                "reason": "purchase already paid",
                "confirmation_id": confirmation.id,
            })),
        ));
    }

    if !queries::cancel_confirmation(&conn, &confirmation.id)? {
        return Ok((
            StatusCode::OK,
            Json(json!({ "status": "already_processed", "confirmation_id": confirmation.id })),
        ));
    }

    tracing::info!(
        provider = provider.as_ref(),
        confirmation_id = %confirmation.id,
        reason = %cancel.reason,
        "Pending purchase cancelled by provider"
    );
    audit_webhook(
        state,
        headers,
        provider,
        AuditAction::ReceiveCancellationWebhook,
        &confirmation.id,
        json!({ "reason": cancel.reason }),
    );

    Ok((
        StatusCode::OK,
        Json(json!({ "status": "cancelled", "confirmation_id": confirmation.id })),
    ))
}

fn settled_response(settlement: &Settlement) -> WebhookResult {
    let prizes: Vec<PublicInstantPrize> = settlement
        .instant_prizes
        .iter()
        .map(PublicInstantPrize::from)
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "confirmation_id": settlement.confirmation.id,
            "numbers": settlement.numbers,
            "instant_prizes": prizes,
        })),
    )
}

fn audit_webhook(
    state: &AppState,
    headers: &HeaderMap,
    provider: PaymentProvider,
    action: AuditAction,
    confirmation_id: &str,
    details: Value,
) {
    match state.audit.get() {
        Ok(audit_conn) => AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers)
            .actor(ActorType::Webhook, Some(provider.as_ref()))
            .action(action)
            .resource("confirmation", confirmation_id)
            .details(&details)
            .save_or_warn(),
        Err(e) => tracing::warn!("Audit DB connection error: {}", e),
    }
}

/// Email the buyer their numbers in the background. Failures are logged only.
pub fn spawn_purchase_email(state: &AppState, settlement: &Settlement) {
    let state = state.clone();
    let settlement = settlement.clone();

    tokio::spawn(async move {
        let confirmation = &settlement.confirmation;
        let loaded = state.db.get().map_err(AppError::from).and_then(|conn| {
            let raffle = queries::get_raffle_by_id(&conn, &confirmation.raffle_id)?
                .or_not_found(msg::RAFFLE_NOT_FOUND)?;
            let settings = queries::get_settings(&conn)?;
            Ok((raffle, settings))
        });
        let (raffle, settings) = match loaded {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(confirmation_id = %confirmation.id, "Skipping purchase email: {}", e);
                return;
            }
        };

        let email = PurchaseEmail {
            to_email: &confirmation.buyer_email,
            buyer_name: &confirmation.buyer_name,
            raffle: &raffle,
            numbers: &settlement.numbers,
            instant_prizes: &settlement.instant_prizes,
            settings: &settings,
            confirmation_id: &confirmation.id,
        };
        if let Err(e) = state.email_service.send_purchase_confirmation(email).await {
            tracing::warn!(confirmation_id = %confirmation.id, "Purchase email failed: {}", e);
        }
    });
}
