use serde::{Deserialize, Serialize};

/// A number that pays out immediately to whoever buys it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantPrize {
    pub id: String,
    pub raffle_id: String,
    pub number_value: i64,
    pub prize_description: String,
    pub prize_amount_cents: Option<i64>,
    /// Purchase that received this number, once sold
    pub confirmation_id: Option<String>,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
}

impl InstantPrize {
    pub fn is_claimed(&self) -> bool {
        self.confirmation_id.is_some()
    }
}

/// Storefront view: which prize numbers exist and whether they are gone.
#[derive(Debug, Clone, Serialize)]
pub struct PublicInstantPrize {
    pub number_value: i64,
    pub prize_description: String,
    pub prize_amount_cents: Option<i64>,
    pub claimed: bool,
}

impl From<&InstantPrize> for PublicInstantPrize {
    fn from(prize: &InstantPrize) -> Self {
        Self {
            number_value: prize.number_value,
            prize_description: prize.prize_description.clone(),
            prize_amount_cents: prize.prize_amount_cents,
            claimed: prize.is_claimed(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInstantPrize {
    pub number_value: i64,
    pub prize_description: String,
    #[serde(default)]
    pub prize_amount_cents: Option<i64>,
}
