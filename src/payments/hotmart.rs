//! Hotmart webhook (postback v2) payload types.

use serde::Deserialize;

/// Header carrying the account's shared secret.
pub const HOTMART_HOTTOK_HEADER: &str = "x-hotmart-hottok";

#[derive(Debug, Deserialize)]
pub struct HotmartWebhook {
    pub event: String,
    pub data: HotmartData,
}

#[derive(Debug, Deserialize)]
pub struct HotmartData {
    pub buyer: HotmartBuyer,
    pub purchase: HotmartPurchase,
}

#[derive(Debug, Deserialize)]
pub struct HotmartBuyer {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub checkout_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HotmartPurchase {
    pub transaction: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub price: Option<HotmartPrice>,
}

#[derive(Debug, Deserialize)]
pub struct HotmartPrice {
    pub value: f64,
    #[serde(default)]
    pub currency_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotmartEventKind {
    Approved,
    Cancelled,
    Other,
}

impl HotmartWebhook {
    pub fn kind(&self) -> HotmartEventKind {
        match self.event.as_str() {
            "PURCHASE_APPROVED" | "PURCHASE_COMPLETE" => HotmartEventKind::Approved,
            "PURCHASE_CANCELED" | "PURCHASE_REFUNDED" | "PURCHASE_CHARGEBACK"
            | "PURCHASE_EXPIRED" | "PURCHASE_PROTEST" => HotmartEventKind::Cancelled,
            _ => HotmartEventKind::Other,
        }
    }

    /// Settlement replay key: the transaction id alone, shared by every
    /// approval event (APPROVED, COMPLETE) and redelivery of one payment.
    pub fn settlement_key(&self) -> String {
        self.data.purchase.transaction.trim().to_string()
    }

    pub fn amount_cents(&self) -> Option<i64> {
        self.data
            .purchase
            .price
            .as_ref()
            .and_then(|p| crate::util::cents_from_decimal(p.value))
    }
}
