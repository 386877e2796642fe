use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub admin_api_key: Option<String>,
    pub hotmart_hottok: Option<String>,
    pub datafast: Option<DataFastConfig>,
    pub paypal: Option<PayPalConfig>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    /// Pending purchases older than this are cancelled. 0 disables expiry.
    pub pending_ttl_hours: i64,
    pub audit_log_enabled: bool,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct DataFastConfig {
    pub base_url: String,
    pub entity_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Checkout creation (calls DataFast)
    pub strict_rpm: u32,
    /// Purchases and lookups
    pub standard_rpm: u32,
    /// Listings and health
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

/// Read a variable, treating empty strings as unset.
fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TOMBOLA_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_or("PORT", 3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let datafast = match (
            non_empty("DATAFAST_ENTITY_ID"),
            non_empty("DATAFAST_ACCESS_TOKEN"),
        ) {
            (Some(entity_id), Some(access_token)) => Some(DataFastConfig {
                base_url: non_empty("DATAFAST_BASE_URL")
                    .unwrap_or_else(|| "https://eu-test.oppwa.com".to_string()),
                entity_id,
                access_token,
            }),
            _ => None,
        };

        let paypal = match (non_empty("PAYPAL_CLIENT_ID"), non_empty("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(PayPalConfig {
                base_url: non_empty("PAYPAL_BASE_URL")
                    .unwrap_or_else(|| "https://api-m.sandbox.paypal.com".to_string()),
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            strict_rpm: parse_or("RATE_LIMIT_STRICT_RPM", defaults.strict_rpm).max(1),
            standard_rpm: parse_or("RATE_LIMIT_STANDARD_RPM", defaults.standard_rpm).max(1),
            relaxed_rpm: parse_or("RATE_LIMIT_RELAXED_RPM", defaults.relaxed_rpm).max(1),
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tombola.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "tombola_audit.db".to_string()),
            base_url,
            dev_mode,
            admin_api_key: non_empty("ADMIN_API_KEY"),
            hotmart_hottok: non_empty("HOTMART_HOTTOK"),
            datafast,
            paypal,
            resend_api_key: non_empty("RESEND_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Tombola <tickets@example.com>".to_string()),
            pending_ttl_hours: parse_or("PENDING_TTL_HOURS", 48i64).max(0),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            rate_limit,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
