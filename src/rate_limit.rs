//! Per-IP rate limiting for the storefront routes.
//!
//! Tiers:
//! - Strict: DataFast checkout creation (calls the gateway)
//! - Standard: purchases, purchase lookup
//! - Relaxed: raffle listings, quotes, /health
//!
//! Webhooks and the admin API are not rate limited.

use std::sync::Arc;
use std::time::Duration;

use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Layer allowing a burst of `requests_per_minute`, refilled evenly over the minute.
pub fn layer(requests_per_minute: u32) -> RateLimitLayer {
    let rpm = requests_per_minute.max(1);
    let replenish = Duration::from_millis(60_000 / rpm as u64);

    let mut builder = GovernorConfigBuilder::default();
    builder.period(replenish.max(Duration::from_millis(1)));
    builder.burst_size(rpm);
    let config = builder
        .finish()
        .expect("Failed to build rate limiter config");

    GovernorLayer::new(Arc::new(config))
}
