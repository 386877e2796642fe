pub mod common;
pub mod datafast;
pub mod hotmart;
pub mod paypal;

pub use datafast::handle_datafast_callback;
pub use hotmart::handle_hotmart_webhook;
pub use paypal::handle_paypal_confirmation;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/hotmart", post(handle_hotmart_webhook))
        .route("/webhooks/paypal", post(handle_paypal_confirmation))
        // DataFast redirects the buyer here with ?id=<checkout id>
        .route("/webhooks/datafast", get(handle_datafast_callback))
}
