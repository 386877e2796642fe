mod from_row;
pub mod queries;
mod schema;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::email::EmailService;
use crate::payments::{DataFastClient, PayPalClient};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools, provider clients and secrets
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (raffles, confirmations, numbers, settings)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    /// Public base URL (used for DataFast result redirects)
    pub base_url: String,
    pub audit_log_enabled: bool,
    /// Bearer key for the admin API. None disables the admin API.
    pub admin_api_key: Option<String>,
    /// Shared secret Hotmart sends in `x-hotmart-hottok`
    pub hotmart_hottok: Option<String>,
    pub datafast: Option<Arc<DataFastClient>>,
    /// When set, PayPal orders are verified against the Orders API before settling
    pub paypal: Option<Arc<PayPalClient>>,
    pub email_service: Arc<EmailService>,
}

/// Open a pool where every connection has WAL, a busy timeout and foreign keys.
///
/// The busy timeout matters: settlements take the write lock with
/// `BEGIN IMMEDIATE`, so concurrent webhooks wait instead of failing.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
