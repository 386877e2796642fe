mod checkout;
mod purchases;
mod raffles;

pub use checkout::*;
pub use purchases::*;
pub use raffles::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Storefront routes with per-IP rate limits.
pub fn router(limits: RateLimitConfig) -> Router<AppState> {
    let strict = Router::new()
        .route("/raffles/{id}/checkout/datafast", post(create_datafast_checkout))
        .layer(rate_limit::layer(limits.strict_rpm));

    let standard = Router::new()
        .route("/raffles/{id}/purchases", post(create_purchase))
        .route("/purchases", get(list_purchases))
        .layer(rate_limit::layer(limits.standard_rpm));

    let relaxed = Router::new()
        .route("/health", get(health))
        .route("/raffles", get(list_raffles))
        .route("/raffles/{id}", get(get_raffle))
        .route("/raffles/{id}/quote", get(quote_raffle))
        .layer(rate_limit::layer(limits.relaxed_rpm));

    strict.merge(standard).merge(relaxed)
}

/// Same routes without rate limiting (tests, trusted deployments behind a proxy).
pub fn router_unlimited() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/raffles", get(list_raffles))
        .route("/raffles/{id}", get(get_raffle))
        .route("/raffles/{id}/quote", get(quote_raffle))
        .route("/raffles/{id}/purchases", post(create_purchase))
        .route("/raffles/{id}/checkout/datafast", post(create_datafast_checkout))
        .route("/purchases", get(list_purchases))
}
