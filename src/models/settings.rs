use serde::{Deserialize, Serialize};

use super::deserialize_optional_nullable;

/// Storefront settings (single row). Provider secrets live in the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub contact_whatsapp: Option<String>,
    pub support_email: Option<String>,
    /// Send purchase confirmation emails
    pub email_enabled: bool,
    pub updated_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSiteSettings {
    pub site_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub contact_whatsapp: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub support_email: Option<Option<String>>,
    pub email_enabled: Option<bool>,
}
