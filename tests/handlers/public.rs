//! Storefront endpoints: listings, quotes, purchases and DataFast checkout.

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::json;
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn purchase_body(quantity: i64) -> serde_json::Value {
    json!({
        "buyer_name": "Ana Perez",
        "buyer_email": "Ana@Example.com",
        "buyer_phone": "+593999000111",
        "quantity": quantity
    })
}

#[tokio::test]
async fn test_health() {
    let app = public_app(test_state());
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_list_raffles_hides_drafts() {
    let state = test_state();
    let active_id = {
        let conn = state.db.get().unwrap();
        create_draft_raffle(&conn, 10, 100);
        create_active_raffle(&conn, 10, 100).id
    };

    let response = public_app(state).oneshot(get("/raffles")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let raffles = json.as_array().unwrap();
    assert_eq!(raffles.len(), 1);
    assert_eq!(raffles[0]["id"], active_id);
    assert_eq!(raffles[0]["available_numbers"], 10);
}

#[tokio::test]
async fn test_raffle_detail_includes_packages_and_prizes() {
    let state = test_state();
    let (raffle_id, draft_id) = {
        let mut conn = state.db.get().unwrap();
        let raffle = create_active_raffle(&conn, 4, 100);
        create_test_package(&conn, &raffle.id, 2, 150);
        create_test_prize(&conn, &raffle, 3);
        let pending = create_pending(&conn, &raffle, "ana@example.com", 4, PaymentProvider::Manual, None);
        settle(&mut conn, &pending.id);
        let draft = create_draft_raffle(&conn, 10, 100);
        (raffle.id, draft.id)
    };

    let app = public_app(state);
    let response = app
        .clone()
        .oneshot(get(&format!("/raffles/{}", raffle_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["numbers_sold"], 4);
    assert_eq!(json["is_sold_out"], true);
    assert_eq!(json["sold_percentage"], 100.0);
    assert_eq!(json["packages"].as_array().unwrap().len(), 1);
    let prizes = json["instant_prizes"].as_array().unwrap();
    assert_eq!(prizes.len(), 1);
    assert_eq!(prizes[0]["number_value"], 3);
    assert_eq!(prizes[0]["claimed"], true);
    assert!(
        prizes[0].get("confirmation_id").is_none(),
        "storefront must not expose who won"
    );

    let response = app
        .oneshot(get(&format!("/raffles/{}", draft_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quote_uses_matching_package() {
    let state = test_state();
    let raffle_id = {
        let conn = state.db.get().unwrap();
        let raffle = create_active_raffle(&conn, 100, 150);
        create_test_package(&conn, &raffle.id, 10, 1200);
        raffle.id
    };
    let app = public_app(state);

    let response = app
        .clone()
        .oneshot(get(&format!("/raffles/{}/quote?quantity=10", raffle_id)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total_cents"], 1200);
    assert!(json["package_id"].is_string());

    let response = app
        .clone()
        .oneshot(get(&format!("/raffles/{}/quote?quantity=3", raffle_id)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["total_cents"], 450);
    assert!(json["package_id"].is_null());

    let response = app
        .oneshot(get(&format!("/raffles/{}/quote?quantity=0", raffle_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_purchase_is_pending_without_numbers() {
    let state = test_state();
    let raffle_id = {
        let conn = state.db.get().unwrap();
        create_active_raffle(&conn, 100, 200).id
    };

    let response = public_app(state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/raffles/{}/purchases", raffle_id),
            &purchase_body(3),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["payment_provider"], "hotmart");
    assert_eq!(json["buyer_email"], "ana@example.com");
    assert_eq!(json["total_cents"], 600);

    let conn = state.db.get().unwrap();
    assert_eq!(queries::count_raffle_numbers(&conn, &raffle_id).unwrap(), 0);

    let audit = state.audit.get().unwrap();
    let logs = queries::list_audit_logs(
        &audit,
        &AuditLogQuery {
            actor_type: Some(ActorType::Public),
            action: None,
            resource_type: None,
            resource_id: None,
            limit: None,
        },
    )
    .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "create_purchase");
}

#[tokio::test]
async fn test_create_purchase_validation() {
    let state = test_state();
    let (raffle_id, closed_id) = {
        let conn = state.db.get().unwrap();
        let raffle = create_active_raffle(&conn, 5, 100);
        let closed = create_active_raffle(&conn, 5, 100);
        queries::set_raffle_status(&conn, &closed.id, RaffleStatus::Closed).unwrap();
        (raffle.id, closed.id)
    };
    let app = public_app(state);
    let uri = format!("/raffles/{}/purchases", raffle_id);

    let mut bad_email = purchase_body(1);
    bad_email["buyer_email"] = json!("not-an-email");
    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, &bad_email))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, &purchase_body(6)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT, "more than the pool");

    let mut paypal = purchase_body(1);
    paypal["payment_provider"] = json!("paypal");
    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, &paypal))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/raffles/{}/purchases", closed_id),
            &purchase_body(1),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(json_request("POST", "/raffles/missing/purchases", &purchase_body(1)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_lookup_by_email() {
    let state = test_state();
    {
        let mut conn = state.db.get().unwrap();
        let raffle = create_active_raffle(&conn, 50, 100);
        let paid = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Manual, None);
        settle(&mut conn, &paid.id);
        create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Hotmart, None);
        create_pending(&conn, &raffle, "ben@example.com", 1, PaymentProvider::Hotmart, None);
    }
    let app = public_app(state);

    let response = app
        .clone()
        .oneshot(get("/purchases?email=ANA@example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let purchases = json.as_array().unwrap();
    assert_eq!(purchases.len(), 2);
    let paid = purchases.iter().find(|p| p["status"] == "paid").unwrap();
    assert_eq!(paid["numbers"].as_array().unwrap().len(), 3);

    let response = app.oneshot(get("/purchases?email=nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_datafast_checkout_requires_configuration() {
    let state = test_state();
    let raffle_id = {
        let conn = state.db.get().unwrap();
        create_active_raffle(&conn, 50, 100).id
    };

    let response = public_app(state)
        .oneshot(json_request(
            "POST",
            &format!("/raffles/{}/checkout/datafast", raffle_id),
            &purchase_body(1),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_datafast_checkout_links_pending_purchase() {
    let state = test_state_with_datafast().await;
    let raffle_id = {
        let conn = state.db.get().unwrap();
        create_active_raffle(&conn, 50, 250).id
    };

    let response = public_app(state.clone())
        .oneshot(json_request(
            "POST",
            &format!("/raffles/{}/checkout/datafast", raffle_id),
            &purchase_body(5),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["checkout_id"], "chk_new");
    assert_eq!(json["total_cents"], 1250);
    assert!(
        json["widget_url"]
            .as_str()
            .unwrap()
            .ends_with("/v1/paymentWidgets.js?checkoutId=chk_new")
    );
    assert_eq!(json["result_url"], "http://localhost:3000/webhooks/datafast");

    let conn = state.db.get().unwrap();
    let confirmation = queries::get_confirmation_by_reference(&conn, PaymentProvider::Datafast, "chk_new")
        .unwrap()
        .unwrap();
    assert_eq!(confirmation.id, json["confirmation_id"]);
    assert_eq!(confirmation.status, ConfirmationStatus::Pending);
}
