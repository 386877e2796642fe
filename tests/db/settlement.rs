//! Settlement: allocation, idempotency, replay keys and instant prizes.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tombola::error::AppError;

#[test]
fn test_settle_assigns_distinct_numbers_in_range() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 100, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 12, PaymentProvider::Manual, None);

    let settlement = settle(&mut conn, &pending.id);

    assert_eq!(settlement.numbers.len(), 12);
    let unique: HashSet<i64> = settlement.numbers.iter().copied().collect();
    assert_eq!(unique.len(), 12, "numbers must be distinct");
    assert!(settlement.numbers.iter().all(|n| (1..=100).contains(n)));
    assert!(
        settlement.numbers.windows(2).all(|w| w[0] < w[1]),
        "numbers are returned sorted"
    );

    assert_eq!(settlement.confirmation.status, ConfirmationStatus::Paid);
    assert!(settlement.confirmation.resolved_at.is_some());

    let stored = queries::get_confirmation_numbers(&conn, &pending.id).unwrap();
    assert_eq!(stored, settlement.numbers);

    let raffle = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert_eq!(raffle.numbers_sold, 12);
    assert_eq!(queries::count_raffle_numbers(&conn, &raffle.id).unwrap(), 12);
}

#[test]
fn test_seeded_rng_is_deterministic() {
    let draw = |seed: u64| {
        let mut conn = setup_test_db();
        let raffle = create_active_raffle(&conn, 500, 100);
        let pending = create_pending(&conn, &raffle, "ana@example.com", 8, PaymentProvider::Manual, None);
        let mut rng = StdRng::seed_from_u64(seed);
        match queries::settle_confirmation_with_rng(&mut conn, &pending.id, &PaymentReceipt::default(), &mut rng)
            .unwrap()
        {
            SettleOutcome::Settled(s) => s.numbers,
            other => panic!("unexpected outcome {:?}", other),
        }
    };
    assert_eq!(draw(42), draw(42));
}

#[test]
fn test_second_settlement_is_a_no_op() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 50, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 5, PaymentProvider::Manual, None);

    let first = settle(&mut conn, &pending.id);
    let again = queries::settle_confirmation(&mut conn, &pending.id, &PaymentReceipt::default()).unwrap();

    assert!(matches!(
        again,
        SettleOutcome::AlreadyResolved {
            status: ConfirmationStatus::Paid,
            ..
        }
    ));
    assert_eq!(
        queries::get_confirmation_numbers(&conn, &pending.id).unwrap(),
        first.numbers,
        "numbers must not change on a repeated settlement"
    );
    assert_eq!(queries::count_raffle_numbers(&conn, &raffle.id).unwrap(), 5);
}

#[test]
fn test_cancelled_purchase_cannot_settle() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 50, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 5, PaymentProvider::Manual, None);
    assert!(queries::cancel_confirmation(&conn, &pending.id).unwrap());

    let outcome = queries::settle_confirmation(&mut conn, &pending.id, &PaymentReceipt::default()).unwrap();
    assert!(matches!(
        outcome,
        SettleOutcome::AlreadyResolved {
            status: ConfirmationStatus::Cancelled,
            ..
        }
    ));
    assert_eq!(queries::count_raffle_numbers(&conn, &raffle.id).unwrap(), 0);
}

#[test]
fn test_replayed_event_id_is_not_settled_twice() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 50, 100);
    let first = create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Hotmart, None);
    let second = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Hotmart, None);

    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Hotmart),
        reference: None,
        amount_paid_cents: None,
        event_id: Some("evt-1".to_string()),
    };

    assert!(matches!(
        queries::settle_confirmation(&mut conn, &first.id, &receipt).unwrap(),
        SettleOutcome::Settled(_)
    ));
    // Same delivery pointed at another pending purchase
    let replay = queries::settle_confirmation(&mut conn, &second.id, &receipt).unwrap();
    assert!(matches!(
        replay,
        SettleOutcome::AlreadyResolved {
            status: ConfirmationStatus::Pending,
            ..
        }
    ));
    assert!(queries::get_confirmation_numbers(&conn, &second.id).unwrap().is_empty());
}

#[test]
fn test_receipt_fills_reference_and_amount() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 50, 250);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Manual, None);

    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Hotmart),
        reference: Some("HP-0001".to_string()),
        amount_paid_cents: Some(500),
        event_id: Some("HP-0001:PURCHASE_APPROVED".to_string()),
    };
    let SettleOutcome::Settled(settlement) =
        queries::settle_confirmation(&mut conn, &pending.id, &receipt).unwrap()
    else {
        panic!("expected settlement");
    };

    let c = settlement.confirmation;
    assert_eq!(c.payment_provider, PaymentProvider::Hotmart);
    assert_eq!(c.payment_reference.as_deref(), Some("HP-0001"));
    assert_eq!(c.amount_paid_cents, Some(500));
}

#[test]
fn test_existing_reference_is_kept() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 50, 100);
    let pending = create_pending(
        &conn,
        &raffle,
        "ana@example.com",
        1,
        PaymentProvider::Datafast,
        Some("checkout-1"),
    );

    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Datafast),
        reference: Some("checkout-other".to_string()),
        amount_paid_cents: Some(100),
        event_id: None,
    };
    let SettleOutcome::Settled(settlement) =
        queries::settle_confirmation(&mut conn, &pending.id, &receipt).unwrap()
    else {
        panic!("expected settlement");
    };
    assert_eq!(
        settlement.confirmation.payment_reference.as_deref(),
        Some("checkout-1")
    );
}

#[test]
fn test_exact_remaining_pool_sells_out() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 10, 100);

    let mut all = Vec::new();
    for quantity in [3, 3, 4] {
        let pending = create_pending(&conn, &raffle, "ana@example.com", quantity, PaymentProvider::Manual, None);
        all.extend(settle(&mut conn, &pending.id).numbers);
    }
    all.sort_unstable();
    assert_eq!(all, (1..=10).collect::<Vec<_>>());

    let raffle = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert!(raffle.is_sold_out());
    assert!(!raffle.is_accepting_purchases());
}

#[test]
fn test_insufficient_numbers_rolls_back_everything() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 5, 100);
    let first = create_pending(&conn, &raffle, "ana@example.com", 4, PaymentProvider::Manual, None);
    settle(&mut conn, &first.id);

    let second = create_pending(&conn, &raffle, "ben@example.com", 2, PaymentProvider::Hotmart, None);
    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Hotmart),
        reference: Some("HP-2".to_string()),
        amount_paid_cents: Some(200),
        event_id: Some("evt-2".to_string()),
    };
    let err = queries::settle_confirmation(&mut conn, &second.id, &receipt).unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientNumbers {
            requested: 2,
            available: 1
        }
    ));

    let second = queries::get_confirmation_by_id(&conn, &second.id).unwrap().unwrap();
    assert_eq!(second.status, ConfirmationStatus::Pending, "purchase stays pending");
    assert_eq!(second.payment_reference, None, "claim was rolled back");
    assert!(queries::get_confirmation_numbers(&conn, &second.id).unwrap().is_empty());

    let raffle = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert_eq!(raffle.numbers_sold, 4);

    // The replay key was rolled back too, so a later retry is still accepted
    assert!(queries::try_record_webhook_event(&conn, "hotmart", "evt-2").unwrap());
}

#[test]
fn test_closed_raffle_rejects_settlement() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 20, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Manual, None);
    queries::set_raffle_status(&conn, &raffle.id, RaffleStatus::Closed).unwrap();

    let err = queries::settle_confirmation(&mut conn, &pending.id, &PaymentReceipt::default()).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let pending = queries::get_confirmation_by_id(&conn, &pending.id).unwrap().unwrap();
    assert_eq!(pending.status, ConfirmationStatus::Pending);
}

#[test]
fn test_unknown_confirmation_is_not_found() {
    let mut conn = setup_test_db();
    let err = queries::settle_confirmation(&mut conn, "missing", &PaymentReceipt::default()).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn test_instant_prizes_are_claimed_by_the_buyer() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 3, 100);
    let prize = create_test_prize(&conn, &raffle, 2);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Manual, None);

    let settlement = settle(&mut conn, &pending.id);

    assert_eq!(settlement.instant_prizes.len(), 1);
    assert_eq!(settlement.instant_prizes[0].id, prize.id);
    assert_eq!(
        settlement.instant_prizes[0].confirmation_id.as_deref(),
        Some(pending.id.as_str())
    );

    let stored = queries::list_instant_prizes_for_confirmation(&conn, &pending.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].claimed_at.is_some());
}

#[test]
fn test_prize_claimed_only_when_its_number_is_drawn() {
    for seed in 0..20 {
        let mut conn = setup_test_db();
        let raffle = create_active_raffle(&conn, 10, 100);
        create_test_prize(&conn, &raffle, 10);
        let pending = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Manual, None);

        let mut rng = StdRng::seed_from_u64(seed);
        let SettleOutcome::Settled(settlement) =
            queries::settle_confirmation_with_rng(&mut conn, &pending.id, &PaymentReceipt::default(), &mut rng)
                .unwrap()
        else {
            panic!("expected settlement");
        };

        let won = settlement.numbers.contains(&10);
        assert_eq!(settlement.instant_prizes.len(), won as usize, "seed {}", seed);
    }
}

#[test]
fn test_release_frees_numbers_and_prizes() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 4, 100);
    create_test_prize(&conn, &raffle, 1);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 4, PaymentProvider::Manual, None);
    settle(&mut conn, &pending.id);

    let released = queries::release_confirmation_numbers(&mut conn, &pending.id).unwrap();
    assert_eq!(released, 4);

    let raffle = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert_eq!(raffle.numbers_sold, 0);
    let prizes = queries::list_instant_prizes(&conn, &raffle.id).unwrap();
    assert!(!prizes[0].is_claimed());

    // Released numbers can be sold again
    let next = create_pending(&conn, &raffle, "ben@example.com", 4, PaymentProvider::Manual, None);
    assert_eq!(settle(&mut conn, &next.id).numbers, vec![1, 2, 3, 4]);
}

#[test]
fn test_release_requires_paid_purchase() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 4, 100);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Manual, None);

    let err = queries::release_confirmation_numbers(&mut conn, &pending.id).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[test]
fn test_expire_stale_pending_leaves_paid_alone() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 20, 100);
    let stale = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Hotmart, None);
    let paid = create_pending(&conn, &raffle, "ben@example.com", 1, PaymentProvider::Manual, None);
    settle(&mut conn, &paid.id);

    let cutoff = chrono::Utc::now().timestamp() + 10;
    assert_eq!(queries::expire_stale_pending(&conn, cutoff).unwrap(), 1);

    let stale = queries::get_confirmation_by_id(&conn, &stale.id).unwrap().unwrap();
    assert_eq!(stale.status, ConfirmationStatus::Cancelled);
    let paid = queries::get_confirmation_by_id(&conn, &paid.id).unwrap().unwrap();
    assert_eq!(paid.status, ConfirmationStatus::Paid);
}

#[test]
fn test_latest_pending_by_email_is_case_insensitive() {
    let conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 20, 100);
    let older = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Hotmart, None);
    let newer = create_pending(&conn, &raffle, "Ana@Example.com", 2, PaymentProvider::Hotmart, None);

    let found = queries::find_latest_pending_by_email(&conn, "  ANA@example.COM ", None)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, newer.id);

    queries::cancel_confirmation(&conn, &newer.id).unwrap();
    let found = queries::find_latest_pending_by_email(&conn, "ana@example.com", Some(&raffle.id))
        .unwrap()
        .unwrap();
    assert_eq!(found.id, older.id);
}

#[test]
fn test_insert_collision_is_redrawn() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 10, 100);
    let other = create_pending(&conn, &raffle, "ben@example.com", 1, PaymentProvider::Manual, None);
    let pending = create_pending(&conn, &raffle, "ana@example.com", 3, PaymentProvider::Manual, None);

    // Takes the first number the settlement tries to insert, once, as a row
    // the settlement's sold set never saw.
    conn.execute_batch(&format!(
        "CREATE TABLE taken_once (number_value INTEGER);
         CREATE TRIGGER take_first_number BEFORE INSERT ON ticket_numbers
         WHEN NOT EXISTS (SELECT 1 FROM taken_once)
         BEGIN
             INSERT INTO taken_once VALUES (NEW.number_value);
             INSERT INTO ticket_numbers (id, raffle_id, number_value, confirmation_id, buyer_email, created_at)
             VALUES ('taken', NEW.raffle_id, NEW.number_value, '{}', 'ben@example.com', NEW.created_at);
         END;",
        other.id
    ))
    .unwrap();

    let settlement = settle(&mut conn, &pending.id);
    let taken: i64 = conn
        .query_row("SELECT number_value FROM taken_once", [], |row| row.get(0))
        .unwrap();

    assert_eq!(settlement.numbers.len(), 3);
    assert!(!settlement.numbers.contains(&taken), "collided number is replaced");
    assert_eq!(queries::get_confirmation_numbers(&conn, &pending.id).unwrap(), settlement.numbers);

    let raffle = queries::get_raffle_by_id(&conn, &raffle.id).unwrap().unwrap();
    assert_eq!(raffle.numbers_sold, 4, "recount includes the colliding row");
}

#[test]
fn test_latest_pending_by_email_skips_purchases_with_a_reference() {
    let conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 20, 100);
    let open = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Hotmart, None);
    create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Datafast, Some("chk_abandoned"));

    let found = queries::find_latest_pending_by_email(&conn, "ana@example.com", None)
        .unwrap()
        .unwrap();
    assert_eq!(found.id, open.id, "a checkout-bound purchase is never matched by email");
}

#[test]
fn test_email_target_prefers_existing_reference() {
    let mut conn = setup_test_db();
    let raffle = create_active_raffle(&conn, 20, 100);
    let older = create_pending(&conn, &raffle, "ana@example.com", 1, PaymentProvider::Hotmart, None);
    let newer = create_pending(&conn, &raffle, "ana@example.com", 2, PaymentProvider::Hotmart, None);

    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Hotmart),
        reference: Some("HP-A".to_string()),
        amount_paid_cents: None,
        event_id: Some("HP-A".to_string()),
    };
    let target = queries::SettleTarget::LatestPendingByEmail {
        email: "ana@example.com",
        raffle_id: None,
    };

    let SettleOutcome::Settled(first) = queries::settle_target(&mut conn, target, &receipt).unwrap() else {
        panic!("expected settlement");
    };
    assert_eq!(first.confirmation.id, newer.id);
    assert_eq!(first.confirmation.payment_reference.as_deref(), Some("HP-A"));

    // Same payment again: resolved by its reference, not by the next pending purchase
    match queries::settle_target(&mut conn, target, &receipt).unwrap() {
        SettleOutcome::AlreadyResolved {
            confirmation_id,
            status,
        } => {
            assert_eq!(confirmation_id, newer.id);
            assert_eq!(status, ConfirmationStatus::Paid);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    let older = queries::get_confirmation_by_id(&conn, &older.id).unwrap().unwrap();
    assert_eq!(older.status, ConfirmationStatus::Pending);
}

#[test]
fn test_email_target_without_pending_purchase() {
    let mut conn = setup_test_db();
    create_active_raffle(&conn, 20, 100);
    let receipt = PaymentReceipt {
        provider: Some(PaymentProvider::Hotmart),
        reference: Some("HP-X".to_string()),
        amount_paid_cents: None,
        event_id: Some("HP-X".to_string()),
    };
    let target = queries::SettleTarget::LatestPendingByEmail {
        email: "nobody@example.com",
        raffle_id: None,
    };

    let err = queries::settle_target(&mut conn, target, &receipt).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    // The replay key rolled back with the failed lookup
    assert!(queries::try_record_webhook_event(&conn, "hotmart", "HP-X").unwrap());
}
