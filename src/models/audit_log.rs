use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorType {
    Admin,
    /// Inbound payment provider callback
    Webhook,
    Public,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CreateRaffle,
    UpdateRaffle,
    ChangeRaffleStatus,
    DeleteRaffle,
    CreatePackage,
    DeletePackage,
    CreateInstantPrize,
    DeleteInstantPrize,
    UpdateSettings,
    CreatePurchase,
    ConfirmPurchase,
    CancelPurchase,
    ReleaseNumbers,
    ReceivePaymentWebhook,
    ReceiveCancellationWebhook,
    ExpirePendingPurchases,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: i64,
    pub actor_type: ActorType,
    /// Provider name for webhooks, None for admin/system
    pub actor_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditLog {
    /// One-line rendering: `[2026-01-15 14:32:05] [webhook:paypal] confirm_purchase confirmation abc`
    pub fn formatted(&self) -> String {
        use chrono::{TimeZone, Utc};

        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.timestamp.to_string());

        let actor = match &self.actor_id {
            Some(id) => format!("{}:{}", self.actor_type.as_ref(), id),
            None => self.actor_type.as_ref().to_string(),
        };

        format!(
            "[{}] [{}] {} {} {}",
            timestamp, actor, self.action, self.resource_type, self.resource_id
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub actor_type: Option<ActorType>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Maximum number of items to return (default: 50, max: 200)
    pub limit: Option<i64>,
}

impl AuditLogQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}
