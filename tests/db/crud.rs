//! Raffle, package, instant prize and settings queries.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use tombola::error::AppError;

#[test]
fn test_new_raffle_starts_as_draft() {
    let conn = setup_test_db();
    let raffle = create_draft_raffle(&conn, 1000, 150);
    assert_eq!(raffle.status, RaffleStatus::Draft);
    assert_eq!(raffle.numbers_sold, 0);

    let fetched = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert_eq!(fetched.title, "Test Raffle");
    assert_eq!(fetched.total_numbers, 1000);
}

#[test]
fn test_list_raffles_filters_by_status() {
    let conn = setup_test_db();
    create_draft_raffle(&conn, 10, 100);
    let active = create_active_raffle(&conn, 10, 100);

    let all = queries::list_raffles(&conn, None).unwrap();
    assert_eq!(all.len(), 2);
    let only_active = queries::list_raffles(&conn, Some(RaffleStatus::Active)).unwrap();
    assert_eq!(only_active.len(), 1);
    assert_eq!(only_active[0].id, active.id);
}

#[test]
fn test_status_transitions_are_enforced() {
    let conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 10, 100);

    let err = queries::set_raffle_status(&conn, &raffle.id, RaffleStatus::Draft).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let closed = queries::set_raffle_status(&conn, &raffle.id, RaffleStatus::Closed)
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, RaffleStatus::Closed);

    assert!(queries::set_raffle_status(&conn, "missing", RaffleStatus::Active).unwrap().is_none());
}

#[test]
fn test_update_raffle_partial_fields() {
    let conn = setup_test_db();
    let raffle = create_draft_raffle(&conn, 10, 100);

    let input = UpdateRaffle {
        title: Some("  New title ".to_string()),
        description: Some(Some("Details".to_string())),
        ..Default::default()
    };
    let updated = queries::update_raffle(&conn, &raffle.id, &input).unwrap().unwrap();
    assert_eq!(updated.title, "New title");
    assert_eq!(updated.description.as_deref(), Some("Details"));
    assert_eq!(updated.price_per_number_cents, 100, "untouched field kept");

    let clear = UpdateRaffle {
        description: Some(None),
        ..Default::default()
    };
    let updated = queries::update_raffle(&conn, &raffle.id, &clear).unwrap().unwrap();
    assert_eq!(updated.description, None);
}

#[test]
fn test_pool_size_locked_after_first_sale() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 10, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Manual, None);
    settle(&mut conn, &pending.id);

    let input = UpdateRaffle {
        total_numbers: Some(20),
        ..Default::default()
    };
    let err = queries::update_raffle(&conn, &raffle.id, &input).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let price_only = UpdateRaffle {
        price_per_number_cents: Some(200),
        ..Default::default()
    };
    assert!(queries::update_raffle(&conn, &raffle.id, &price_only).unwrap().is_some());
}

#[test]
fn test_pool_cannot_shrink_below_prizes_or_packages() {
    let conn = setup_test_db();
    let raffle = create_draft_raffle(&conn, 100, 100);
    create_test_prize(&conn, &raffle, 80);
    create_test_package(&conn, &raffle.id, 50, 4000);

    let shrink = |total| UpdateRaffle {
        total_numbers: Some(total),
        ..Default::default()
    };
    let err = queries::update_raffle(&conn, &raffle.id, &shrink(60)).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "prize on 80 is out of range");
    let err = queries::update_raffle(&conn, &raffle.id, &shrink(40)).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let updated = queries::update_raffle(&conn, &raffle.id, &shrink(80)).unwrap().unwrap();
    assert_eq!(updated.total_numbers, 80);
}

#[test]
fn test_delete_raffle_with_sales_is_refused() {
    let mut conn = setup_test_db();
    let sold = create_active_raffle(&conn, 10, 100);
    let pending = create_pending(&conn, &sold, "ana@example.com", 1, PaymentProvider::Manual, None);
    settle(&mut conn, &pending.id);

    assert!(matches!(
        queries::delete_raffle(&conn, &sold.id).unwrap_err(),
        AppError::Conflict(_)
    ));

    let empty = create_draft_raffle(&conn, 10, 100);
    create_test_package(&conn, &empty.id, 5, 400);
    assert!(queries::delete_raffle(&conn, &empty.id).unwrap());
    assert!(queries::list_packages(&conn, &empty.id).unwrap().is_empty(), "packages cascade");
    assert!(!queries::delete_raffle(&conn, &empty.id).unwrap());
}

#[test]
fn test_duplicate_package_quantity_conflicts() {
    let conn = setup_test_db();
    let raffle = create_draft_raffle(&conn, 100, 100);
    create_test_package(&conn, &raffle.id, 10, 800);

    let input = CreatePackage {
        quantity: 10,
        price_cents: 700,
        label: None,
        is_featured: false,
    };
    assert!(matches!(
        queries::create_package(&conn, &raffle.id, &input).unwrap_err(),
        AppError::Conflict(_)
    ));
}

#[test]
fn test_delete_package_scoped_to_raffle() {
    let conn = setup_test_db();
    let raffle = create_draft_raffle(&conn, 100, 100);
    let other = create_draft_raffle(&conn, 100, 100);
    let package = create_test_package(&conn, &raffle.id, 10, 800);

    assert!(!queries::delete_package(&conn, &other.id, &package.id).unwrap());
    assert!(queries::delete_package(&conn, &raffle.id, &package.id).unwrap());
}

#[test]
fn test_instant_prize_validation() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 3, 100);

    let out_of_range = CreateInstantPrize {
        number_value: 4,
        prize_description: "Too high".to_string(),
        prize_amount_cents: None,
    };
    assert!(matches!(
        queries::create_instant_prize(&conn, &raffle, &out_of_range).unwrap_err(),
        AppError::BadRequest(_)
    ));

    let blank = CreateInstantPrize {
        number_value: 1,
        prize_description: "   ".to_string(),
        prize_amount_cents: None,
    };
    assert!(matches!(
        queries::create_instant_prize(&conn, &raffle, &blank).unwrap_err(),
        AppError::BadRequest(_)
    ));

    create_test_prize(&conn, &raffle, 1);
    let duplicate = CreateInstantPrize {
        number_value: 1,
        prize_description: "Again".to_string(),
        prize_amount_cents: None,
    };
    assert!(matches!(
        queries::create_instant_prize(&conn, &raffle, &duplicate).unwrap_err(),
        AppError::Conflict(_)
    ));

    // Sell the whole pool, then no new prize can be placed
    let pending = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Manual, None);
    settle(&mut conn, &pending.id);
    let on_sold = CreateInstantPrize {
        number_value: 2,
        prize_description: "Late".to_string(),
        prize_amount_cents: None,
    };
    assert!(matches!(
        queries::create_instant_prize(&conn, &raffle, &on_sold).unwrap_err(),
        AppError::Conflict(_)
    ));
}

#[test]
fn test_claimed_prize_cannot_be_deleted() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 2, 100);
    let claimed = create_test_prize(&conn, &raffle, 1);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Manual, None);
    settle(&mut conn, &pending.id);

    assert!(matches!(
        queries::delete_instant_prize(&conn, &raffle.id, &claimed.id).unwrap_err(),
        AppError::Conflict(_)
    ));
    assert!(!queries::delete_instant_prize(&conn, &raffle.id, "missing").unwrap());
}

#[test]
fn test_settings_update() {
    let conn = setup_test_db();
    let defaults = queries::get_settings(&conn).unwrap();
    assert_eq!(defaults.site_name, "Tombola");
    assert!(defaults.email_enabled);

    let input = UpdateSiteSettings {
        site_name: Some("Rifas Ana".to_string()),
        contact_whatsapp: Some(Some("+593999999999".to_string())),
        email_enabled: Some(false),
        ..Default::default()
    };
    let updated = queries::update_settings(&conn, &input).unwrap();
    assert_eq!(updated.site_name, "Rifas Ana");
    assert_eq!(updated.contact_whatsapp.as_deref(), Some("+593999999999"));
    assert!(!updated.email_enabled);

    let blank = UpdateSiteSettings {
        site_name: Some(" ".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        queries::update_settings(&conn, &blank).unwrap_err(),
        AppError::BadRequest(_)
    ));
}

#[test]
fn test_webhook_event_recorded_once() {
    let conn = setup_test_db();
    assert!(queries::try_record_webhook_event(&conn, "hotmart", "evt-1").unwrap());
    assert!(!queries::try_record_webhook_event(&conn, "hotmart", "evt-1").unwrap());
    assert!(queries::try_record_webhook_event(&conn, "paypal", "evt-1").unwrap());
    assert_eq!(queries::purge_old_webhook_events(&conn, 30).unwrap(), 0);
}

#[test]
fn test_audit_log_disabled_writes_nothing() {
    let conn = setup_test_audit_db();
    let entry = queries::create_audit_log(
        &conn,
        false,
        ActorType::Admin,
        None,
        AuditAction::CreateRaffle,
        "raffle",
        "r1",
        None,
        None,
        None,
    )
    .unwrap();
    assert!(entry.is_none());

    let query = AuditLogQuery {
        actor_type: None,
        action: None,
        resource_type: None,
        resource_id: None,
        limit: None,
    };
    assert!(queries::list_audit_logs(&conn, &query).unwrap().is_empty());
}
