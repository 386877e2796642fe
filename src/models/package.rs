use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

use super::Raffle;

/// Pricing tier: a fixed bundle of numbers sold at a fixed price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub raffle_id: String,
    pub quantity: i64,
    pub price_cents: i64,
    pub label: Option<String>,
    pub is_featured: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackage {
    pub quantity: i64,
    pub price_cents: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}

impl CreatePackage {
    pub fn validate(&self, raffle: &Raffle) -> Result<()> {
        if self.quantity <= 0 {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }
        if self.quantity > raffle.total_numbers {
            return Err(AppError::BadRequest(
                "Package quantity exceeds the raffle's pool".into(),
            ));
        }
        if self.price_cents < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        Ok(())
    }
}

/// Price for a requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub quantity: i64,
    pub total_cents: i64,
    pub currency: String,
    /// Set when a package with exactly this quantity set the price
    pub package_id: Option<String>,
}

impl Quote {
    /// A package whose quantity matches exactly wins; otherwise unit price.
    pub fn compute(raffle: &Raffle, packages: &[Package], quantity: i64) -> Result<Quote> {
        if quantity <= 0 {
            return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
        }

        if let Some(package) = packages
            .iter()
            .find(|p| p.raffle_id == raffle.id && p.quantity == quantity)
        {
            return Ok(Quote {
                quantity,
                total_cents: package.price_cents,
                currency: raffle.currency.clone(),
                package_id: Some(package.id.clone()),
            });
        }

        let total_cents = quantity
            .checked_mul(raffle.price_per_number_cents)
            .ok_or_else(|| AppError::BadRequest("Quantity too large".into()))?;

        Ok(Quote {
            quantity,
            total_cents,
            currency: raffle.currency.clone(),
            package_id: None,
        })
    }
}
