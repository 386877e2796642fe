//! Test utilities and fixtures for Tombola integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

pub use tombola::db::queries::{self, PaymentReceipt};
pub use tombola::db::{AppState, DbPool, create_pool, init_audit_db, init_db};
pub use tombola::email::EmailService;
pub use tombola::handlers;
pub use tombola::models::*;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const HOTTOK: &str = "test-hottok";

/// Path for a throwaway SQLite file.
///
/// In-memory databases are per-connection, so pooled tests use real files.
pub fn temp_db_path(label: &str) -> String {
    std::env::temp_dir()
        .join(format!("tombola_test_{}_{}.db", label, uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory test audit database with schema initialized
pub fn setup_test_audit_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory audit database");
    init_audit_db(&conn).expect("Failed to initialize audit schema");
    conn
}

/// File-backed pool with the main schema.
pub fn test_pool() -> DbPool {
    let pool = create_pool(&temp_db_path("main")).expect("Failed to create pool");
    init_db(&pool.get().unwrap()).expect("Failed to initialize schema");
    pool
}

/// App state with file-backed pools, audit logging on and no provider clients.
pub fn test_state() -> AppState {
    let audit = create_pool(&temp_db_path("audit")).expect("Failed to create audit pool");
    init_audit_db(&audit.get().unwrap()).expect("Failed to initialize audit schema");

    AppState {
        db: test_pool(),
        audit,
        base_url: "http://localhost:3000".to_string(),
        audit_log_enabled: true,
        admin_api_key: Some(ADMIN_KEY.to_string()),
        hotmart_hottok: Some(HOTTOK.to_string()),
        datafast: None,
        paypal: None,
        email_service: Arc::new(EmailService::new(None, "test@example.com".to_string())),
    }
}

pub fn public_app(state: AppState) -> Router {
    handlers::public::router_unlimited().with_state(state)
}

pub fn webhook_app(state: AppState) -> Router {
    handlers::webhooks::router().with_state(state)
}

pub fn admin_app(state: AppState) -> Router {
    handlers::admin::router(state.clone()).with_state(state)
}

/// Create a raffle and move it to Active.
pub fn create_active_raffle(conn: &Connection, total_numbers: i64, price_cents: i64) -> Raffle {
    let raffle = create_draft_raffle(conn, total_numbers, price_cents);
    queries::set_raffle_status(conn, &raffle.id, RaffleStatus::Active)
        .expect("Failed to activate raffle")
        .expect("Raffle missing after create")
}

pub fn create_draft_raffle(conn: &Connection, total_numbers: i64, price_cents: i64) -> Raffle {
    let input = CreateRaffle {
        title: "Test Raffle".to_string(),
        description: None,
        image_url: None,
        total_numbers,
        price_per_number_cents: price_cents,
        currency: "usd".to_string(),
        draw_date: None,
    };
    queries::create_raffle(conn, &input).expect("Failed to create test raffle")
}

pub fn create_test_package(conn: &Connection, raffle_id: &str, quantity: i64, price_cents: i64) -> Package {
    let input = CreatePackage {
        quantity,
        price_cents,
        label: None,
        is_featured: false,
    };
    queries::create_package(conn, raffle_id, &input).expect("Failed to create test package")
}

pub fn create_test_prize(conn: &Connection, raffle: &Raffle, number_value: i64) -> InstantPrize {
    let input = CreateInstantPrize {
        number_value,
        prize_description: format!("Prize on {}", number_value),
        prize_amount_cents: Some(1000),
    };
    queries::create_instant_prize(conn, raffle, &input).expect("Failed to create test prize")
}

/// Pending purchase at the unit price.
pub fn create_pending(
    conn: &Connection,
    raffle: &Raffle,
    email: &str,
    quantity: i64,
    provider: PaymentProvider,
    reference: Option<&str>,
) -> PurchaseConfirmation {
    let purchase = NewPurchase {
        buyer_name: "Test Buyer".to_string(),
        buyer_email: email.to_string(),
        buyer_phone: None,
        quantity,
    };
    let input = CreateConfirmation::from_purchase(
        &raffle.id,
        &purchase,
        quantity * raffle.price_per_number_cents,
        &raffle.currency,
        provider,
        reference.map(String::from),
    );
    queries::create_confirmation(conn, &input).expect("Failed to create pending purchase")
}

/// Settle as an admin would (no provider, no replay key).
pub fn settle(conn: &mut Connection, confirmation_id: &str) -> Settlement {
    match queries::settle_confirmation(conn, confirmation_id, &PaymentReceipt::default())
        .expect("Settlement failed")
    {
        SettleOutcome::Settled(s) => s,
        other => panic!("expected settlement, got {:?}", other),
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", ADMIN_KEY));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Local stand-in for the DataFast (OPPWA) API.
///
/// `POST /v1/checkouts` always creates `chk_new`. Payment status depends on
/// the checkout id: `chk_ok` paid 12.50, `chk_pending` still processing,
/// anything else rejected.
pub async fn spawn_fake_datafast() -> String {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use serde_json::json;

    async fn create_checkout() -> axum::Json<Value> {
        axum::Json(json!({
            "id": "chk_new",
            "result": {"code": "000.200.100", "description": "successfully created checkout"}
        }))
    }

    async fn payment_status(Path(id): Path<String>) -> (StatusCode, axum::Json<Value>) {
        match id.as_str() {
            "chk_ok" => (
                StatusCode::OK,
                axum::Json(json!({
                    "id": "pay_1",
                    "result": {"code": "000.100.110", "description": "Request successfully processed"},
                    "amount": "12.50",
                    "currency": "USD"
                })),
            ),
            "chk_pending" => (
                StatusCode::OK,
                axum::Json(json!({
                    "result": {"code": "000.200.000", "description": "transaction pending"}
                })),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "result": {"code": "800.100.151", "description": "transaction declined (invalid card)"}
                })),
            ),
        }
    }

    let app = Router::new()
        .route("/v1/checkouts", post(create_checkout))
        .route("/v1/checkouts/{id}/payment", get(payment_status));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// State whose DataFast client points at [`spawn_fake_datafast`].
pub async fn test_state_with_datafast() -> AppState {
    let base_url = spawn_fake_datafast().await;
    let mut state = test_state();
    state.datafast = Some(Arc::new(tombola::payments::DataFastClient::new(
        &tombola::config::DataFastConfig {
            base_url,
            entity_id: "entity-test".to_string(),
            access_token: "token-test".to_string(),
        },
    )));
    state
}
