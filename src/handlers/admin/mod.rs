mod audit_logs;
mod confirmations;
mod instant_prizes;
mod numbers;
mod packages;
mod raffles;
mod settings;

pub use audit_logs::*;
pub use confirmations::*;
pub use instant_prizes::*;
pub use numbers::*;
pub use packages::*;
pub use raffles::*;
pub use settings::*;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::db::AppState;
use crate::middleware::admin_auth;

/// Path for routes nested under a raffle.
#[derive(Debug, Deserialize)]
pub struct RaffleChildPath {
    pub raffle_id: String,
    pub id: String,
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Raffles
        .route("/admin/raffles", post(create_raffle).get(list_raffles))
        .route(
            "/admin/raffles/{raffle_id}",
            get(get_raffle).put(update_raffle).delete(delete_raffle),
        )
        .route("/admin/raffles/{raffle_id}/status", post(change_raffle_status))
        // Packages
        .route(
            "/admin/raffles/{raffle_id}/packages",
            post(create_package).get(list_packages),
        )
        .route("/admin/raffles/{raffle_id}/packages/{id}", delete(delete_package))
        // Instant prizes
        .route(
            "/admin/raffles/{raffle_id}/instant-prizes",
            post(create_instant_prize).get(list_instant_prizes),
        )
        .route(
            "/admin/raffles/{raffle_id}/instant-prizes/{id}",
            delete(delete_instant_prize),
        )
        // Sold numbers
        .route("/admin/raffles/{raffle_id}/numbers", get(list_numbers))
        // Purchases
        .route("/admin/confirmations", get(list_confirmations))
        .route("/admin/confirmations/{id}", get(get_confirmation))
        .route("/admin/confirmations/{id}/confirm", post(confirm_purchase))
        .route("/admin/confirmations/{id}/cancel", post(cancel_purchase))
        .route("/admin/confirmations/{id}/release", post(release_numbers))
        // Settings and audit
        .route("/admin/settings", get(get_settings).put(update_settings))
        .route("/admin/audit-logs", get(list_audit_logs))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
