use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

use super::deserialize_optional_nullable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RaffleStatus {
    Draft,
    Active,
    Closed,
}

impl RaffleStatus {
    pub fn can_transition_to(self, next: RaffleStatus) -> bool {
        matches!(
            (self, next),
            (RaffleStatus::Draft, RaffleStatus::Active)
                | (RaffleStatus::Draft, RaffleStatus::Closed)
                | (RaffleStatus::Active, RaffleStatus::Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raffle {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Pool size; tickets are numbered 1..=total_numbers
    pub total_numbers: i64,
    pub price_per_number_cents: i64,
    pub currency: String,
    /// Count of sold ticket rows, maintained in the same transaction as inserts
    pub numbers_sold: i64,
    pub status: RaffleStatus,
    pub draw_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Raffle {
    pub fn available_numbers(&self) -> i64 {
        (self.total_numbers - self.numbers_sold).max(0)
    }

    pub fn is_sold_out(&self) -> bool {
        self.numbers_sold >= self.total_numbers
    }

    /// Percentage sold, rounded to two decimals.
    pub fn sold_percentage(&self) -> f64 {
        if self.total_numbers <= 0 {
            return 0.0;
        }
        let pct = self.numbers_sold as f64 * 100.0 / self.total_numbers as f64;
        (pct * 100.0).round() / 100.0
    }

    /// Zero-pad a ticket number to the width of the pool size (1000 -> "0042").
    pub fn format_number(&self, number: i64) -> String {
        let width = self.total_numbers.max(1).to_string().len();
        format!("{:0width$}", number, width = width)
    }

    pub fn is_accepting_purchases(&self) -> bool {
        self.status == RaffleStatus::Active && !self.is_sold_out()
    }
}

/// Raffle as returned by the API, with the derived sales figures.
#[derive(Debug, Clone, Serialize)]
pub struct RaffleView {
    #[serde(flatten)]
    pub raffle: Raffle,
    pub sold_percentage: f64,
    pub available_numbers: i64,
    pub is_sold_out: bool,
}

impl From<Raffle> for RaffleView {
    fn from(raffle: Raffle) -> Self {
        Self {
            sold_percentage: raffle.sold_percentage(),
            available_numbers: raffle.available_numbers(),
            is_sold_out: raffle.is_sold_out(),
            raffle,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRaffle {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub total_numbers: i64,
    pub price_per_number_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub draw_date: Option<i64>,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl CreateRaffle {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".into()));
        }
        validate_pool(self.total_numbers)?;
        if self.price_per_number_cents < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        validate_currency(&self.currency)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRaffle {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub image_url: Option<Option<String>>,
    /// Only allowed while nothing has been sold
    pub total_numbers: Option<i64>,
    pub price_per_number_cents: Option<i64>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub draw_date: Option<Option<i64>>,
}

impl UpdateRaffle {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref title) = self.title
            && title.trim().is_empty()
        {
            return Err(AppError::BadRequest("Title cannot be empty".into()));
        }
        if let Some(total) = self.total_numbers {
            validate_pool(total)?;
        }
        if let Some(price) = self.price_per_number_cents
            && price < 0
        {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        if let Some(ref currency) = self.currency {
            validate_currency(currency)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRaffleStatus {
    pub status: RaffleStatus,
}

/// Largest pool the allocator is expected to handle.
pub const MAX_TOTAL_NUMBERS: i64 = 1_000_000;

fn validate_pool(total_numbers: i64) -> Result<()> {
    if total_numbers <= 0 || total_numbers > MAX_TOTAL_NUMBERS {
        return Err(AppError::BadRequest(format!(
            "total_numbers must be between 1 and {}",
            MAX_TOTAL_NUMBERS
        )));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> Result<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(
            "Currency must be a 3-letter ISO code".into(),
        ));
    }
    Ok(())
}
