use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

use super::{InstantPrize, is_plausible_email, normalize_email};

/// Lifecycle of a purchase attempt. `Paid` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Paid,
    Cancelled,
}

impl ConfirmationStatus {
    pub fn can_transition_to(self, next: ConfirmationStatus) -> bool {
        matches!(
            (self, next),
            (ConfirmationStatus::Pending, ConfirmationStatus::Paid)
                | (ConfirmationStatus::Pending, ConfirmationStatus::Cancelled)
        )
    }

    /// Check a transition, producing the error returned to API callers.
    pub fn ensure_transition(self, next: ConfirmationStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "Cannot move purchase from {} to {}",
                self.as_ref(),
                next.as_ref()
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentProvider {
    Datafast,
    Paypal,
    Hotmart,
    /// Settled by an admin (bank transfer, cash, WhatsApp orders)
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseConfirmation {
    pub id: String,
    pub raffle_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub quantity: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: ConfirmationStatus,
    pub payment_provider: PaymentProvider,
    /// Provider transaction id (PayPal order, Hotmart transaction, DataFast checkout)
    pub payment_reference: Option<String>,
    pub amount_paid_cents: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub resolved_at: Option<i64>,
}

/// Buyer-supplied data for a new pending purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchase {
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    pub quantity: i64,
}

impl NewPurchase {
    pub fn validate(&self) -> Result<()> {
        if self.buyer_name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::BUYER_NAME_REQUIRED.into()));
        }
        if !is_plausible_email(&self.buyer_email) {
            return Err(AppError::BadRequest(msg::INVALID_EMAIL.into()));
        }
        if self.quantity <= 0 {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        Ok(())
    }
}

/// Row-level input for inserting a confirmation.
#[derive(Debug, Clone)]
pub struct CreateConfirmation {
    pub raffle_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub quantity: i64,
    pub total_cents: i64,
    pub currency: String,
    pub payment_provider: PaymentProvider,
    pub payment_reference: Option<String>,
}

impl CreateConfirmation {
    pub fn from_purchase(
        raffle_id: &str,
        purchase: &NewPurchase,
        total_cents: i64,
        currency: &str,
        provider: PaymentProvider,
        reference: Option<String>,
    ) -> Self {
        Self {
            raffle_id: raffle_id.to_string(),
            buyer_name: purchase.buyer_name.trim().to_string(),
            buyer_email: normalize_email(&purchase.buyer_email),
            buyer_phone: purchase
                .buyer_phone
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            quantity: purchase.quantity,
            total_cents,
            currency: currency.to_string(),
            payment_provider: provider,
            payment_reference: reference,
        }
    }
}

/// A confirmation together with its assigned numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationWithNumbers {
    #[serde(flatten)]
    pub confirmation: PurchaseConfirmation,
    pub numbers: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmationFilters {
    pub raffle_id: Option<String>,
    pub status: Option<ConfirmationStatus>,
    pub email: Option<String>,
    pub limit: Option<i64>,
}

/// Outcome of settling a pending confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub confirmation: PurchaseConfirmation,
    pub numbers: Vec<i64>,
    pub instant_prizes: Vec<InstantPrize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SettleOutcome {
    Settled(Settlement),
    /// The confirmation was no longer pending, or the payment was already
    /// recorded; nothing was allocated
    AlreadyResolved {
        confirmation_id: String,
        status: ConfirmationStatus,
    },
}
