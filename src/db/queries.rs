use std::collections::HashSet;

use chrono::Utc;
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior, params, types::Value};
use uuid::Uuid;

use crate::allocator;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::*;

use super::from_row::{
    AUDIT_LOG_COLS, CONFIRMATION_COLS, FromRow, INSTANT_PRIZE_COLS, PACKAGE_COLS, RAFFLE_COLS,
    SETTINGS_COLS, TICKET_NUMBER_COLS, query_all, query_one,
};

/// Draw rounds before giving up when inserts keep colliding.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 5;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
        }
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Some(Some(v)) sets v, Some(None) sets NULL, None leaves the column alone.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<Option<V>>) -> Self {
        match value {
            Some(Some(v)) => self.fields.push((column, v.into())),
            Some(None) => self.fields.push((column, Value::Null)),
            None => {}
        }
        self
    }

    /// Execute and return the updated row. `updated_at` is always bumped.
    fn execute_returning<T: FromRow>(mut self, conn: &Connection, returning_cols: &str) -> Result<Option<T>> {
        self.fields.push(("updated_at", now().into()));
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(values))?;
        match rows.next()? {
            Some(row) => Ok(Some(T::from_row(row)?)),
            None => Ok(None),
        }
    }
}

// ============ Raffles ============

pub fn create_raffle(conn: &Connection, input: &CreateRaffle) -> Result<Raffle> {
    let id = gen_id();
    let now = now();
    let currency = input.currency.to_lowercase();

    conn.execute(
        "INSERT INTO raffles (id, title, description, image_url, total_numbers, price_per_number_cents, currency, numbers_sold, status, draw_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 'draft', ?8, ?9, ?9)",
        params![
            &id,
            input.title.trim(),
            &input.description,
            &input.image_url,
            input.total_numbers,
            input.price_per_number_cents,
            &currency,
            input.draw_date,
            now
        ],
    )?;

    Ok(Raffle {
        id,
        title: input.title.trim().to_string(),
        description: input.description.clone(),
        image_url: input.image_url.clone(),
        total_numbers: input.total_numbers,
        price_per_number_cents: input.price_per_number_cents,
        currency,
        numbers_sold: 0,
        status: RaffleStatus::Draft,
        draw_date: input.draw_date,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_raffle_by_id(conn: &Connection, id: &str) -> Result<Option<Raffle>> {
    query_one(
        conn,
        &format!("SELECT {} FROM raffles WHERE id = ?1", RAFFLE_COLS),
        &[&id],
    )
}

pub fn list_raffles(conn: &Connection, status: Option<RaffleStatus>) -> Result<Vec<Raffle>> {
    match status {
        Some(status) => query_all(
            conn,
            &format!(
                "SELECT {} FROM raffles WHERE status = ?1 ORDER BY created_at DESC",
                RAFFLE_COLS
            ),
            &[&status.as_ref()],
        ),
        None => query_all(
            conn,
            &format!("SELECT {} FROM raffles ORDER BY created_at DESC", RAFFLE_COLS),
            &[],
        ),
    }
}

/// Update raffle fields. The pool size can only change before the first sale.
pub fn update_raffle(conn: &Connection, id: &str, input: &UpdateRaffle) -> Result<Option<Raffle>> {
    let Some(existing) = get_raffle_by_id(conn, id)? else {
        return Ok(None);
    };
    if input.total_numbers.is_some() && existing.numbers_sold > 0 {
        return Err(AppError::Conflict(
            "Pool size cannot change after numbers have been sold".into(),
        ));
    }
    if let Some(total) = input.total_numbers {
        let (max_prize, max_package): (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT (SELECT MAX(number_value) FROM instant_prizes WHERE raffle_id = ?1),
                    (SELECT MAX(quantity) FROM packages WHERE raffle_id = ?1)",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if let Some(max_prize) = max_prize
            && max_prize > total
        {
            return Err(AppError::Conflict(format!(
                "Instant prize on number {} is outside a pool of {}",
                max_prize, total
            )));
        }
        if let Some(max_package) = max_package
            && max_package > total
        {
            return Err(AppError::Conflict(format!(
                "A package of {} numbers does not fit a pool of {}",
                max_package, total
            )));
        }
    }

    UpdateBuilder::new("raffles", id)
        .set_opt("title", input.title.as_ref().map(|t| t.trim().to_string()))
        .set_nullable("description", input.description.clone())
        .set_nullable("image_url", input.image_url.clone())
        .set_opt("total_numbers", input.total_numbers)
        .set_opt("price_per_number_cents", input.price_per_number_cents)
        .set_opt("currency", input.currency.as_ref().map(|c| c.to_lowercase()))
        .set_nullable("draw_date", input.draw_date)
        .execute_returning(conn, RAFFLE_COLS)
}

/// Move a raffle through draft -> active -> closed.
pub fn set_raffle_status(conn: &Connection, id: &str, next: RaffleStatus) -> Result<Option<Raffle>> {
    let Some(raffle) = get_raffle_by_id(conn, id)? else {
        return Ok(None);
    };
    if !raffle.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move raffle from {} to {}",
            raffle.status.as_ref(),
            next.as_ref()
        )));
    }
    UpdateBuilder::new("raffles", id)
        .set("status", next.as_ref().to_string())
        .execute_returning(conn, RAFFLE_COLS)
}

/// Delete a raffle that has no sold numbers. Returns false if it does not exist.
pub fn delete_raffle(conn: &Connection, id: &str) -> Result<bool> {
    let Some(raffle) = get_raffle_by_id(conn, id)? else {
        return Ok(false);
    };
    if raffle.numbers_sold > 0 {
        return Err(AppError::Conflict(
            "Raffles with sold numbers cannot be deleted; close them instead".into(),
        ));
    }
    let deleted = conn.execute(
        "DELETE FROM raffles WHERE id = ?1 AND numbers_sold = 0",
        params![id],
    )?;
    Ok(deleted > 0)
}

// ============ Packages ============

pub fn create_package(conn: &Connection, raffle_id: &str, input: &CreatePackage) -> Result<Package> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO packages (id, raffle_id, quantity, price_cents, label, is_featured, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            raffle_id,
            input.quantity,
            input.price_cents,
            &input.label,
            input.is_featured as i32,
            now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!(
                "A package for {} numbers already exists",
                input.quantity
            ))
        }
        other => other.into(),
    })?;

    Ok(Package {
        id,
        raffle_id: raffle_id.to_string(),
        quantity: input.quantity,
        price_cents: input.price_cents,
        label: input.label.clone(),
        is_featured: input.is_featured,
        created_at: now,
    })
}

pub fn list_packages(conn: &Connection, raffle_id: &str) -> Result<Vec<Package>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM packages WHERE raffle_id = ?1 ORDER BY quantity",
            PACKAGE_COLS
        ),
        &[&raffle_id],
    )
}

pub fn delete_package(conn: &Connection, raffle_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM packages WHERE id = ?1 AND raffle_id = ?2",
        params![id, raffle_id],
    )?;
    Ok(deleted > 0)
}

// ============ Instant Prizes ============

pub fn create_instant_prize(
    conn: &Connection,
    raffle: &Raffle,
    input: &CreateInstantPrize,
) -> Result<InstantPrize> {
    if input.number_value < 1 || input.number_value > raffle.total_numbers {
        return Err(AppError::BadRequest(format!(
            "Prize number must be between 1 and {}",
            raffle.total_numbers
        )));
    }
    if input.prize_description.trim().is_empty() {
        return Err(AppError::BadRequest("Prize description is required".into()));
    }
    let already_sold: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ticket_numbers WHERE raffle_id = ?1 AND number_value = ?2)",
        params![&raffle.id, input.number_value],
        |row| row.get(0),
    )?;
    if already_sold {
        return Err(AppError::Conflict(format!(
            "Number {} has already been sold",
            raffle.format_number(input.number_value)
        )));
    }

    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO instant_prizes (id, raffle_id, number_value, prize_description, prize_amount_cents, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            &raffle.id,
            input.number_value,
            input.prize_description.trim(),
            input.prize_amount_cents,
            now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict("That number already carries an instant prize".into())
        }
        other => other.into(),
    })?;

    Ok(InstantPrize {
        id,
        raffle_id: raffle.id.clone(),
        number_value: input.number_value,
        prize_description: input.prize_description.trim().to_string(),
        prize_amount_cents: input.prize_amount_cents,
        confirmation_id: None,
        claimed_at: None,
        created_at: now,
    })
}

pub fn list_instant_prizes(conn: &Connection, raffle_id: &str) -> Result<Vec<InstantPrize>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM instant_prizes WHERE raffle_id = ?1 ORDER BY number_value",
            INSTANT_PRIZE_COLS
        ),
        &[&raffle_id],
    )
}

pub fn list_instant_prizes_for_confirmation(
    conn: &Connection,
    confirmation_id: &str,
) -> Result<Vec<InstantPrize>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM instant_prizes WHERE confirmation_id = ?1 ORDER BY number_value",
            INSTANT_PRIZE_COLS
        ),
        &[&confirmation_id],
    )
}

/// Delete an unclaimed prize.
pub fn delete_instant_prize(conn: &Connection, raffle_id: &str, id: &str) -> Result<bool> {
    let prize: Option<InstantPrize> = query_one(
        conn,
        &format!(
            "SELECT {} FROM instant_prizes WHERE id = ?1 AND raffle_id = ?2",
            INSTANT_PRIZE_COLS
        ),
        &[&id, &raffle_id],
    )?;
    let Some(prize) = prize else {
        return Ok(false);
    };
    if prize.is_claimed() {
        return Err(AppError::Conflict(
            "Claimed prizes cannot be deleted".into(),
        ));
    }
    let deleted = conn.execute(
        "DELETE FROM instant_prizes WHERE id = ?1 AND confirmation_id IS NULL",
        params![id],
    )?;
    Ok(deleted > 0)
}

// ============ Purchase Confirmations ============

pub fn create_confirmation(conn: &Connection, input: &CreateConfirmation) -> Result<PurchaseConfirmation> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO purchase_confirmations (id, raffle_id, buyer_name, buyer_email, buyer_phone, quantity, total_cents, currency, status, payment_provider, payment_reference, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?10, ?11, ?11)",
        params![
            &id,
            &input.raffle_id,
            &input.buyer_name,
            &input.buyer_email,
            &input.buyer_phone,
            input.quantity,
            input.total_cents,
            &input.currency,
            input.payment_provider.as_ref(),
            &input.payment_reference,
            now
        ],
    )?;

    Ok(PurchaseConfirmation {
        id,
        raffle_id: input.raffle_id.clone(),
        buyer_name: input.buyer_name.clone(),
        buyer_email: input.buyer_email.clone(),
        buyer_phone: input.buyer_phone.clone(),
        quantity: input.quantity,
        total_cents: input.total_cents,
        currency: input.currency.clone(),
        status: ConfirmationStatus::Pending,
        payment_provider: input.payment_provider,
        payment_reference: input.payment_reference.clone(),
        amount_paid_cents: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    })
}

pub fn get_confirmation_by_id(conn: &Connection, id: &str) -> Result<Option<PurchaseConfirmation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchase_confirmations WHERE id = ?1",
            CONFIRMATION_COLS
        ),
        &[&id],
    )
}

pub fn get_confirmation_by_reference(
    conn: &Connection,
    provider: PaymentProvider,
    reference: &str,
) -> Result<Option<PurchaseConfirmation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchase_confirmations WHERE payment_provider = ?1 AND payment_reference = ?2",
            CONFIRMATION_COLS
        ),
        &[&provider.as_ref(), &reference],
    )
}

/// Most recent pending purchase for a buyer that has no provider reference yet,
/// optionally limited to one raffle. Purchases bound to a checkout are only
/// settled through that checkout.
pub fn find_latest_pending_by_email(
    conn: &Connection,
    email: &str,
    raffle_id: Option<&str>,
) -> Result<Option<PurchaseConfirmation>> {
    let email = normalize_email(email);
    match raffle_id {
        Some(raffle_id) => query_one(
            conn,
            &format!(
                "SELECT {} FROM purchase_confirmations
                 WHERE buyer_email = ?1 AND raffle_id = ?2 AND status = 'pending'
                   AND payment_reference IS NULL
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                CONFIRMATION_COLS
            ),
            &[&email, &raffle_id],
        ),
        None => query_one(
            conn,
            &format!(
                "SELECT {} FROM purchase_confirmations
                 WHERE buyer_email = ?1 AND status = 'pending' AND payment_reference IS NULL
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                CONFIRMATION_COLS
            ),
            &[&email],
        ),
    }
}

pub fn list_confirmations(
    conn: &Connection,
    filters: &ConfirmationFilters,
) -> Result<Vec<PurchaseConfirmation>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref raffle_id) = filters.raffle_id {
        clauses.push("raffle_id = ?");
        values.push(raffle_id.clone().into());
    }
    if let Some(status) = filters.status {
        clauses.push("status = ?");
        values.push(status.as_ref().to_string().into());
    }
    if let Some(ref email) = filters.email {
        clauses.push("buyer_email = ?");
        values.push(normalize_email(email).into());
    }
    values.push(filters.limit.unwrap_or(100).clamp(1, 500).into());

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM purchase_confirmations {} ORDER BY created_at DESC, rowid DESC LIMIT ?",
        CONFIRMATION_COLS, where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), PurchaseConfirmation::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_confirmation_numbers(conn: &Connection, confirmation_id: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT number_value FROM ticket_numbers WHERE confirmation_id = ?1 ORDER BY number_value",
    )?;
    let numbers = stmt
        .query_map(params![confirmation_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(numbers)
}

pub fn with_numbers(
    conn: &Connection,
    confirmation: PurchaseConfirmation,
) -> Result<ConfirmationWithNumbers> {
    let numbers = get_confirmation_numbers(conn, &confirmation.id)?;
    Ok(ConfirmationWithNumbers {
        confirmation,
        numbers,
    })
}

/// Every purchase made with this email, newest first, with assigned numbers.
pub fn list_purchases_by_email(conn: &Connection, email: &str) -> Result<Vec<ConfirmationWithNumbers>> {
    let filters = ConfirmationFilters {
        email: Some(email.to_string()),
        ..Default::default()
    };
    list_confirmations(conn, &filters)?
        .into_iter()
        .map(|c| with_numbers(conn, c))
        .collect()
}

/// Attach a provider reference (e.g. a DataFast checkout id) to a pending purchase.
pub fn set_payment_reference(conn: &Connection, id: &str, reference: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE purchase_confirmations SET payment_reference = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![reference, now(), id],
    )?;
    Ok(affected > 0)
}

/// Pending -> Cancelled. Returns false if the purchase was no longer pending.
pub fn cancel_confirmation(conn: &Connection, id: &str) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE purchase_confirmations SET status = 'cancelled', updated_at = ?1, resolved_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![now, id],
    )?;
    Ok(affected > 0)
}

/// Cancel pending purchases created before `cutoff`. Returns how many were cancelled.
pub fn expire_stale_pending(conn: &Connection, cutoff: i64) -> Result<usize> {
    let now = now();
    let affected = conn.execute(
        "UPDATE purchase_confirmations SET status = 'cancelled', updated_at = ?1, resolved_at = ?1
         WHERE status = 'pending' AND created_at < ?2",
        params![now, cutoff],
    )?;
    Ok(affected)
}

// ============ Settlement ============

/// Payment details recorded when a purchase settles.
#[derive(Debug, Clone, Default)]
pub struct PaymentReceipt {
    /// Provider that took the money. None keeps the purchase's provider (admin confirmations).
    pub provider: Option<PaymentProvider>,
    /// Provider transaction id, stored if the purchase had none yet
    pub reference: Option<String>,
    pub amount_paid_cents: Option<i64>,
    /// Replay key, recorded with `provider` inside the settlement transaction
    pub event_id: Option<String>,
}

/// Which purchase a settlement applies to.
#[derive(Debug, Clone, Copy)]
pub enum SettleTarget<'a> {
    Confirmation(&'a str),
    /// The purchase already carrying the receipt's provider reference, else the
    /// buyer's most recent pending purchase that has no reference yet
    LatestPendingByEmail {
        email: &'a str,
        raffle_id: Option<&'a str>,
    },
}

/// Settle a pending purchase: allocate numbers and mark it paid, atomically.
pub fn settle_confirmation(
    conn: &mut Connection,
    confirmation_id: &str,
    receipt: &PaymentReceipt,
) -> Result<SettleOutcome> {
    settle_target(conn, SettleTarget::Confirmation(confirmation_id), receipt)
}

pub fn settle_confirmation_with_rng<R: Rng + ?Sized>(
    conn: &mut Connection,
    confirmation_id: &str,
    receipt: &PaymentReceipt,
    rng: &mut R,
) -> Result<SettleOutcome> {
    settle_target_with_rng(conn, SettleTarget::Confirmation(confirmation_id), receipt, rng)
}

pub fn settle_target(
    conn: &mut Connection,
    target: SettleTarget<'_>,
    receipt: &PaymentReceipt,
) -> Result<SettleOutcome> {
    let mut rng = rand::thread_rng();
    settle_target_with_rng(conn, target, receipt, &mut rng)
}

fn resolve_settle_target(
    conn: &Connection,
    target: SettleTarget<'_>,
    receipt: &PaymentReceipt,
) -> Result<PurchaseConfirmation> {
    match target {
        SettleTarget::Confirmation(id) => {
            get_confirmation_by_id(conn, id)?.or_not_found(msg::CONFIRMATION_NOT_FOUND)
        }
        SettleTarget::LatestPendingByEmail { email, raffle_id } => {
            if let (Some(provider), Some(reference)) =
                (receipt.provider, receipt.reference.as_deref())
                && let Some(existing) = get_confirmation_by_reference(conn, provider, reference)?
            {
                return Ok(existing);
            }
            find_latest_pending_by_email(conn, email, raffle_id)?
                .or_not_found(msg::NO_PENDING_PURCHASE)
        }
    }
}

/// Settlement with an explicit RNG.
///
/// Runs in a `BEGIN IMMEDIATE` transaction: the write lock is taken before the
/// target purchase is looked up and before the sold set is read, so two
/// settlements never pick the same pending purchase or see the same sold set.
/// Inserts still go through `ON CONFLICT DO NOTHING` as a backstop against rows
/// the sold set did not show; such numbers are redrawn, up to
/// `MAX_ALLOCATION_ATTEMPTS` rounds. Any error rolls everything back and the
/// purchase stays pending.
pub fn settle_target_with_rng<R: Rng + ?Sized>(
    conn: &mut Connection,
    target: SettleTarget<'_>,
    receipt: &PaymentReceipt,
    rng: &mut R,
) -> Result<SettleOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = resolve_settle_target(&tx, target, receipt)?;
    let confirmation_id: &str = &current.id;

    if let (Some(provider), Some(event_id)) = (receipt.provider, receipt.event_id.as_deref())
        && !try_record_webhook_event(&tx, provider.as_ref(), event_id)?
    {
        tracing::info!(provider = provider.as_ref(), event_id = %event_id, "Webhook event already processed");
        return Ok(SettleOutcome::AlreadyResolved {
            confirmation_id: current.id.clone(),
            status: current.status,
        });
    }

    if current.status != ConfirmationStatus::Pending {
        return Ok(SettleOutcome::AlreadyResolved {
            confirmation_id: current.id.clone(),
            status: current.status,
        });
    }

    let raffle = get_raffle_by_id(&tx, &current.raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    if raffle.status == RaffleStatus::Closed {
        return Err(AppError::Conflict(
            "Raffle is closed; cancel this purchase instead".into(),
        ));
    }

    let now = now();
    let claimed = tx.execute(
        "UPDATE purchase_confirmations
         SET status = 'paid',
             payment_provider = COALESCE(?2, payment_provider),
             payment_reference = COALESCE(payment_reference, ?3),
             amount_paid_cents = COALESCE(?4, amount_paid_cents),
             updated_at = ?5, resolved_at = ?5
         WHERE id = ?1 AND status = 'pending'",
        params![
            confirmation_id,
            receipt.provider.map(|p| p.as_ref().to_string()),
            &receipt.reference,
            receipt.amount_paid_cents,
            now
        ],
    )?;
    if claimed == 0 {
        return Err(AppError::Internal(format!(
            "Pending purchase {} could not be claimed inside its own transaction",
            confirmation_id
        )));
    }

    let mut excluded = sold_numbers(&tx, &raffle.id)?;
    let mut assigned: Vec<i64> = Vec::with_capacity(current.quantity as usize);
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO ticket_numbers (id, raffle_id, number_value, confirmation_id, buyer_email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(raffle_id, number_value) DO NOTHING",
        )?;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let remaining = current.quantity - assigned.len() as i64;
            if remaining == 0 {
                break;
            }
            if attempt > 1 {
                tracing::warn!(
                    raffle_id = %raffle.id,
                    attempt,
                    collided = remaining,
                    "Ticket numbers collided on insert, drawing replacements"
                );
            }

            let picked = allocator::allocate(rng, remaining, raffle.total_numbers, &excluded)?;
            for number in picked {
                excluded.insert(number);
                let inserted = insert.execute(params![
                    gen_id(),
                    &raffle.id,
                    number,
                    &current.id,
                    &current.buyer_email,
                    now
                ])?;
                if inserted == 1 {
                    assigned.push(number);
                }
            }
        }
    }

    if assigned.len() as i64 != current.quantity {
        return Err(AppError::Internal(format!(
            "Could not place {} unique numbers after {} attempts",
            current.quantity, MAX_ALLOCATION_ATTEMPTS
        )));
    }
    assigned.sort_unstable();

    recount_numbers_sold(&tx, &raffle.id)?;
    let instant_prizes = claim_instant_prizes(&tx, &raffle.id, &current.id, &assigned, now)?;

    let confirmation = get_confirmation_by_id(&tx, confirmation_id)?
        .or_not_found(msg::CONFIRMATION_NOT_FOUND)?;

    tx.commit()?;

    tracing::info!(
        confirmation_id = %confirmation.id,
        raffle_id = %raffle.id,
        quantity = confirmation.quantity,
        instant_prizes = instant_prizes.len(),
        "Purchase settled"
    );

    Ok(SettleOutcome::Settled(Settlement {
        confirmation,
        numbers: assigned,
        instant_prizes,
    }))
}

fn claim_instant_prizes(
    conn: &Connection,
    raffle_id: &str,
    confirmation_id: &str,
    numbers: &[i64],
    now: i64,
) -> Result<Vec<InstantPrize>> {
    let assigned: HashSet<i64> = numbers.iter().copied().collect();
    let hits: Vec<InstantPrize> = list_instant_prizes(conn, raffle_id)?
        .into_iter()
        .filter(|p| !p.is_claimed() && assigned.contains(&p.number_value))
        .collect();

    let mut claimed = Vec::with_capacity(hits.len());
    for mut prize in hits {
        conn.execute(
            "UPDATE instant_prizes SET confirmation_id = ?1, claimed_at = ?2
             WHERE id = ?3 AND confirmation_id IS NULL",
            params![confirmation_id, now, &prize.id],
        )?;
        prize.confirmation_id = Some(confirmation_id.to_string());
        prize.claimed_at = Some(now);
        claimed.push(prize);
    }
    Ok(claimed)
}

/// Remove the numbers of a settled purchase (refund handled outside the system).
/// Instant prizes it claimed are released too. Returns how many numbers were freed.
pub fn release_confirmation_numbers(conn: &mut Connection, confirmation_id: &str) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let confirmation = get_confirmation_by_id(&tx, confirmation_id)?
        .or_not_found(msg::CONFIRMATION_NOT_FOUND)?;
    if confirmation.status != ConfirmationStatus::Paid {
        return Err(AppError::Conflict(
            "Only paid purchases hold numbers".into(),
        ));
    }

    let released = tx.execute(
        "DELETE FROM ticket_numbers WHERE confirmation_id = ?1",
        params![confirmation_id],
    )?;
    tx.execute(
        "UPDATE instant_prizes SET confirmation_id = NULL, claimed_at = NULL WHERE confirmation_id = ?1",
        params![confirmation_id],
    )?;
    recount_numbers_sold(&tx, &confirmation.raffle_id)?;

    tx.commit()?;
    Ok(released)
}

// ============ Ticket Numbers ============

pub fn sold_numbers(conn: &Connection, raffle_id: &str) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT number_value FROM ticket_numbers WHERE raffle_id = ?1")?;
    let numbers = stmt
        .query_map(params![raffle_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<i64>, _>>()?;
    Ok(numbers)
}

pub fn list_raffle_numbers(conn: &Connection, raffle_id: &str) -> Result<Vec<TicketNumber>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM ticket_numbers WHERE raffle_id = ?1 ORDER BY number_value",
            TICKET_NUMBER_COLS
        ),
        &[&raffle_id],
    )
}

pub fn count_raffle_numbers(conn: &Connection, raffle_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM ticket_numbers WHERE raffle_id = ?1",
        params![raffle_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Set `numbers_sold` from the ticket rows. Call inside the inserting transaction.
pub fn recount_numbers_sold(conn: &Connection, raffle_id: &str) -> Result<i64> {
    let sold: i64 = conn.query_row(
        "UPDATE raffles
         SET numbers_sold = (SELECT COUNT(*) FROM ticket_numbers WHERE raffle_id = ?1),
             updated_at = ?2
         WHERE id = ?1
         RETURNING numbers_sold",
        params![raffle_id, now()],
        |row| row.get(0),
    )?;
    Ok(sold)
}

// ============ Settings ============

pub fn get_settings(conn: &Connection) -> Result<SiteSettings> {
    query_one(
        conn,
        &format!("SELECT {} FROM site_settings WHERE id = 1", SETTINGS_COLS),
        &[],
    )?
    .ok_or_else(|| AppError::Internal("site_settings row missing".into()))
}

pub fn update_settings(conn: &Connection, input: &UpdateSiteSettings) -> Result<SiteSettings> {
    if let Some(ref name) = input.site_name
        && name.trim().is_empty()
    {
        return Err(AppError::BadRequest("Site name cannot be empty".into()));
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(ref name) = input.site_name {
        sets.push("site_name = ?");
        values.push(name.trim().to_string().into());
    }
    if let Some(ref whatsapp) = input.contact_whatsapp {
        sets.push("contact_whatsapp = ?");
        values.push(whatsapp.clone().map_or(Value::Null, Value::from));
    }
    if let Some(ref email) = input.support_email {
        sets.push("support_email = ?");
        values.push(email.clone().map_or(Value::Null, Value::from));
    }
    if let Some(enabled) = input.email_enabled {
        sets.push("email_enabled = ?");
        values.push((enabled as i64).into());
    }
    sets.push("updated_at = ?");
    values.push(now().into());

    conn.execute(
        &format!("UPDATE site_settings SET {} WHERE id = 1", sets.join(", ")),
        rusqlite::params_from_iter(values),
    )?;
    get_settings(conn)
}

// ============ Webhook Replay Prevention ============

/// Record a webhook event. Returns false if it was already recorded.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge replay-prevention records older than the retention period.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Option<AuditLog>> {
    if !enabled {
        return Ok(None);
    }

    let id = gen_id();
    let timestamp = now();
    let details_str = details.map(|d| d.to_string());

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            timestamp,
            actor_type.as_ref(),
            actor_id,
            action.as_ref(),
            resource_type,
            resource_id,
            &details_str,
            ip_address,
            user_agent
        ],
    )?;

    Ok(Some(AuditLog {
        id,
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.as_ref().to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    }))
}

pub fn list_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<Vec<AuditLog>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(actor_type) = query.actor_type {
        clauses.push("actor_type = ?");
        values.push(actor_type.as_ref().to_string().into());
    }
    if let Some(ref action) = query.action {
        clauses.push("action = ?");
        values.push(action.clone().into());
    }
    if let Some(ref resource_type) = query.resource_type {
        clauses.push("resource_type = ?");
        values.push(resource_type.clone().into());
    }
    if let Some(ref resource_id) = query.resource_id {
        clauses.push("resource_id = ?");
        values.push(resource_id.clone().into());
    }
    values.push(query.limit().into());

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM audit_logs {} ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        AUDIT_LOG_COLS, where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(values), AuditLog::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
