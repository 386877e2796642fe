//! Purchase confirmation emails via Resend.
//!
//! Delivery is best effort: a settled sale is never rolled back because an
//! email failed. Callers spawn [`EmailService::send_purchase_confirmation`]
//! after the settlement transaction has committed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{InstantPrize, Raffle, SiteSettings};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "To be announced".to_string())
}

fn format_money(cents: i64, currency: &str) -> String {
    format!("{}.{:02} {}", cents / 100, cents % 100, currency.to_uppercase())
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    Sent,
    /// Turned off in site settings
    Disabled,
    NoApiKey,
}

/// Everything the confirmation email shows.
pub struct PurchaseEmail<'a> {
    pub to_email: &'a str,
    pub buyer_name: &'a str,
    pub raffle: &'a Raffle,
    pub numbers: &'a [i64],
    pub instant_prizes: &'a [InstantPrize],
    pub settings: &'a SiteSettings,
    pub confirmation_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: String,
    html: String,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Clone)]
pub struct EmailService {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    /// Send the "here are your numbers" email.
    pub async fn send_purchase_confirmation(&self, email: PurchaseEmail<'_>) -> Result<EmailSendResult> {
        if !email.settings.email_enabled {
            tracing::debug!(
                confirmation_id = %email.confirmation_id,
                "Email disabled in settings, skipping purchase confirmation"
            );
            return Ok(EmailSendResult::Disabled);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(
                confirmation_id = %email.confirmation_id,
                "No Resend API key configured, cannot send purchase confirmation"
            );
            return Ok(EmailSendResult::NoApiKey);
        };

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![email.to_email],
            subject: format!(
                "{}: your numbers for {}",
                email.settings.site_name, email.raffle.title
            ),
            text: render_text(&email),
            html: render_html(&email),
        };

        self.send_request_with_retry(api_key, &request, email.to_email, email.confirmation_id)
            .await
    }

    /// Retries on transient errors (network, 5xx, 429); fails fast on other 4xx.
    async fn send_request_with_retry(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
        to_email: &str,
        confirmation_id: &str,
    ) -> Result<EmailSendResult> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(api_key, request).await {
                Ok(()) => {
                    tracing::info!(
                        attempt,
                        to = %to_email,
                        confirmation_id = %confirmation_id,
                        "Purchase confirmation email sent via Resend"
                    );
                    return Ok(EmailSendResult::Sent);
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            to = %to_email,
            confirmation_id = %confirmation_id,
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error.unwrap_or_else(|| {
            AppError::Internal("Email service error: all retries exhausted".into())
        }))
    }

    /// Returns Err((error, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        api_key: &str,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                (AppError::Internal(format!("Email service error: {}", e)), true)
            })?;

        let status = response.status();
        if status.is_success() {
            let _: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                (AppError::Internal("Email service response error".into()), false)
            })?;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let is_transient = status.as_u16() == 429 || status.is_server_error();
        if is_transient {
            tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
        } else {
            tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
        }
        Err((
            AppError::Internal(format!("Email service error: {} - {}", status, body)),
            is_transient,
        ))
    }
}

fn render_text(email: &PurchaseEmail<'_>) -> String {
    let numbers: Vec<String> = email
        .numbers
        .iter()
        .map(|n| email.raffle.format_number(*n))
        .collect();

    let mut text = format!(
        "Hi {},\n\nYour payment for {} is confirmed. Your numbers:\n\n{}\n\nDraw date: {}\nReference: {}\n",
        email.buyer_name,
        email.raffle.title,
        numbers.join(", "),
        email
            .raffle
            .draw_date
            .map(format_date)
            .unwrap_or_else(|| "To be announced".to_string()),
        email.confirmation_id,
    );

    if !email.instant_prizes.is_empty() {
        text.push_str("\nCongratulations! You won instant prizes:\n");
        for prize in email.instant_prizes {
            let amount = prize
                .prize_amount_cents
                .map(|c| format!(" ({})", format_money(c, &email.raffle.currency)))
                .unwrap_or_default();
            text.push_str(&format!(
                "- Number {}: {}{}\n",
                email.raffle.format_number(prize.number_value),
                prize.prize_description,
                amount
            ));
        }
    }

    if let Some(ref whatsapp) = email.settings.contact_whatsapp {
        text.push_str(&format!("\nQuestions? WhatsApp: {}\n", whatsapp));
    }
    text
}

fn render_html(email: &PurchaseEmail<'_>) -> String {
    let numbers: String = email
        .numbers
        .iter()
        .map(|n| {
            format!(
                r#"<span style="display: inline-block; background: #f5f5f5; border-radius: 6px; padding: 6px 10px; margin: 3px; font-family: monospace; font-size: 18px;">{}</span>"#,
                email.raffle.format_number(*n)
            )
        })
        .collect();

    let prizes = if email.instant_prizes.is_empty() {
        String::new()
    } else {
        let items: String = email
            .instant_prizes
            .iter()
            .map(|p| {
                format!(
                    "<li><strong>{}</strong>: {}</li>",
                    email.raffle.format_number(p.number_value),
                    escape_html(&p.prize_description)
                )
            })
            .collect();
        format!(
            r#"<h3 style="color: #2a7a2a;">You won instant prizes!</h3><ul>{}</ul>"#,
            items
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #333;">{}</h2>
<p>Hi {}, your payment for <strong>{}</strong> is confirmed. Your numbers:</p>
<div style="margin-bottom: 24px;">{}</div>
{}
<p style="color: #666;">Draw date: {}</p>
<hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
<p style="color: #999; font-size: 12px;">Reference: {}</p>
</body>
</html>"#,
        escape_html(&email.settings.site_name),
        escape_html(email.buyer_name),
        escape_html(&email.raffle.title),
        numbers,
        prizes,
        email
            .raffle
            .draw_date
            .map(format_date)
            .unwrap_or_else(|| "To be announced".to_string()),
        email.confirmation_id,
    )
}
