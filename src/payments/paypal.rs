//! PayPal Orders API client, used to verify orders reported by the storefront.

use reqwest::Client;
use serde::Deserialize;

use crate::config::PayPalConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PayPalAmount {
    pub currency_code: String,
    /// Decimal string, e.g. "25.00"
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PayPalCapture {
    pub status: String,
    pub amount: Option<PayPalAmount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayPalPayments {
    #[serde(default)]
    pub captures: Vec<PayPalCapture>,
}

#[derive(Debug, Deserialize)]
pub struct PayPalPurchaseUnit {
    pub amount: Option<PayPalAmount>,
    #[serde(default)]
    pub payments: Option<PayPalPayments>,
}

#[derive(Debug, Deserialize)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<PayPalPurchaseUnit>,
}

impl PayPalOrder {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    /// Sum of completed captures, falling back to the order amount.
    pub fn captured_cents(&self) -> Option<i64> {
        let to_cents = |a: &PayPalAmount| {
            a.value
                .parse::<f64>()
                .ok()
                .and_then(crate::util::cents_from_decimal)
        };

        let captured: Vec<i64> = self
            .purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .filter(|c| c.status == "COMPLETED")
            .filter_map(|c| c.amount.as_ref().and_then(to_cents))
            .collect();
        if !captured.is_empty() {
            return Some(captured.iter().sum());
        }

        self.purchase_units
            .iter()
            .filter_map(|u| u.amount.as_ref().and_then(to_cents))
            .reduce(|a, b| a + b)
    }
}

#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl PayPalClient {
    pub fn new(config: &PayPalConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("PayPal API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "PayPal authentication failed: {}",
                error_text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse PayPal token: {}", e)))?;
        Ok(token.access_token)
    }

    /// Fetch an order. Unknown orders are reported as NotFound.
    pub async fn get_order(&self, order_id: &str) -> Result<PayPalOrder> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, order_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("PayPal API error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("PayPal order not found".into()));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "PayPal order lookup failed: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse PayPal order: {}", e)))
    }
}
