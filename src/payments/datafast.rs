//! DataFast (OPPWA) hosted checkout client.
//!
//! Flow: the storefront creates a checkout server-side, renders the payment
//! widget with the returned id, and DataFast redirects the buyer to
//! `/webhooks/datafast?id=<checkout id>`, where the payment status is queried.

use reqwest::Client;
use serde::Deserialize;

use crate::config::DataFastConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct DataFastResult {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutResponse {
    id: Option<String>,
    result: DataFastResult,
}

/// Payment status for a checkout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFastPaymentStatus {
    /// Payment id (differs from the checkout id)
    pub id: Option<String>,
    pub result: DataFastResult,
    /// Decimal string, e.g. "12.50"
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub merchant_transaction_id: Option<String>,
}

impl DataFastPaymentStatus {
    pub fn amount_cents(&self) -> Option<i64> {
        self.amount
            .as_deref()
            .and_then(|a| a.parse::<f64>().ok())
            .and_then(crate::util::cents_from_decimal)
    }
}

/// How a result code affects the purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCodeClass {
    Success,
    /// Still being processed; leave the purchase pending
    Pending,
    Rejected,
}

/// Classify an OPPWA result code.
///
/// Successful: `000.000.*`, `000.100.1*`, `000.3*`, `000.6*`.
/// Pending: `000.200*`, `800.400.5*`, `100.400.500`.
pub fn classify_result_code(code: &str) -> ResultCodeClass {
    if code.starts_with("000.000.")
        || code.starts_with("000.100.1")
        || code.starts_with("000.3")
        || code.starts_with("000.6")
    {
        ResultCodeClass::Success
    } else if code.starts_with("000.200")
        || code.starts_with("800.400.5")
        || code.starts_with("100.400.500")
    {
        ResultCodeClass::Pending
    } else {
        ResultCodeClass::Rejected
    }
}

fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[derive(Debug, Clone)]
pub struct DataFastClient {
    client: Client,
    base_url: String,
    entity_id: String,
    access_token: String,
}

impl DataFastClient {
    pub fn new(config: &DataFastConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            entity_id: config.entity_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Script URL for the payment widget of a checkout.
    pub fn widget_url(&self, checkout_id: &str) -> String {
        format!(
            "{}/v1/paymentWidgets.js?checkoutId={}",
            self.base_url, checkout_id
        )
    }

    /// Prepare a checkout and return its id.
    pub async fn create_checkout(
        &self,
        amount_cents: i64,
        currency: &str,
        merchant_transaction_id: &str,
        customer_email: &str,
    ) -> Result<String> {
        let amount = format_amount(amount_cents);
        let currency = currency.to_uppercase();
        let form = [
            ("entityId", self.entity_id.as_str()),
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("paymentType", "DB"),
            ("merchantTransactionId", merchant_transaction_id),
            ("customer.email", customer_email),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkouts", self.base_url))
            .bearer_auth(&self.access_token)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("DataFast API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "DataFast checkout failed: {}",
                error_text
            )));
        }

        let checkout: CreateCheckoutResponse = response.json().await.map_err(|e| {
            AppError::Upstream(format!("Failed to parse DataFast response: {}", e))
        })?;

        // 000.200.100 = "successfully created checkout"
        match checkout.id {
            Some(id) if checkout.result.code.starts_with("000.200") => Ok(id),
            _ => Err(AppError::Upstream(format!(
                "DataFast rejected checkout: {} {}",
                checkout.result.code, checkout.result.description
            ))),
        }
    }

    /// Query the payment status for a checkout.
    pub async fn get_payment_status(&self, checkout_id: &str) -> Result<DataFastPaymentStatus> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkouts/{}/payment",
                self.base_url, checkout_id
            ))
            .query(&[("entityId", self.entity_id.as_str())])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("DataFast API error: {}", e)))?;

        // Rejected payments come back as 400 with a normal result body
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("DataFast API error: {}", e)))?;

        serde_json::from_str::<DataFastPaymentStatus>(&body).map_err(|e| {
            AppError::Upstream(format!(
                "Unexpected DataFast response ({}): {} - {}",
                status, e, body
            ))
        })
    }
}
