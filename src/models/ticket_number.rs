use serde::{Deserialize, Serialize};

/// One sold unit of a raffle's pool. Unique per (raffle_id, number_value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketNumber {
    pub id: String,
    pub raffle_id: String,
    pub number_value: i64,
    pub confirmation_id: String,
    pub buyer_email: String,
    pub created_at: i64,
}
