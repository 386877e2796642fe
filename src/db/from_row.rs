//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors
/// instead of panicking on unexpected values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const RAFFLE_COLS: &str = "id, title, description, image_url, total_numbers, price_per_number_cents, currency, numbers_sold, status, draw_date, created_at, updated_at";

pub const PACKAGE_COLS: &str =
    "id, raffle_id, quantity, price_cents, label, is_featured, created_at";

pub const CONFIRMATION_COLS: &str = "id, raffle_id, buyer_name, buyer_email, buyer_phone, quantity, total_cents, currency, status, payment_provider, payment_reference, amount_paid_cents, created_at, updated_at, resolved_at";

pub const TICKET_NUMBER_COLS: &str =
    "id, raffle_id, number_value, confirmation_id, buyer_email, created_at";

pub const INSTANT_PRIZE_COLS: &str = "id, raffle_id, number_value, prize_description, prize_amount_cents, confirmation_id, claimed_at, created_at";

pub const SETTINGS_COLS: &str =
    "site_name, contact_whatsapp, support_email, email_enabled, updated_at";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for Raffle {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Raffle {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            image_url: row.get(3)?,
            total_numbers: row.get(4)?,
            price_per_number_cents: row.get(5)?,
            currency: row.get(6)?,
            numbers_sold: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            draw_date: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for Package {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Package {
            id: row.get(0)?,
            raffle_id: row.get(1)?,
            quantity: row.get(2)?,
            price_cents: row.get(3)?,
            label: row.get(4)?,
            is_featured: row.get::<_, i32>(5)? != 0,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for PurchaseConfirmation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PurchaseConfirmation {
            id: row.get(0)?,
            raffle_id: row.get(1)?,
            buyer_name: row.get(2)?,
            buyer_email: row.get(3)?,
            buyer_phone: row.get(4)?,
            quantity: row.get(5)?,
            total_cents: row.get(6)?,
            currency: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            payment_provider: parse_enum(row, 9, "payment_provider")?,
            payment_reference: row.get(10)?,
            amount_paid_cents: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            resolved_at: row.get(14)?,
        })
    }
}

impl FromRow for TicketNumber {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TicketNumber {
            id: row.get(0)?,
            raffle_id: row.get(1)?,
            number_value: row.get(2)?,
            confirmation_id: row.get(3)?,
            buyer_email: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for InstantPrize {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(InstantPrize {
            id: row.get(0)?,
            raffle_id: row.get(1)?,
            number_value: row.get(2)?,
            prize_description: row.get(3)?,
            prize_amount_cents: row.get(4)?,
            confirmation_id: row.get(5)?,
            claimed_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for SiteSettings {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SiteSettings {
            site_name: row.get(0)?,
            contact_whatsapp: row.get(1)?,
            support_email: row.get(2)?,
            email_enabled: row.get::<_, i32>(3)? != 0,
            updated_at: row.get(4)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(7)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2, "actor_type")?,
            actor_id: row.get(3)?,
            action: row.get(4)?,
            resource_type: row.get(5)?,
            resource_id: row.get(6)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            ip_address: row.get(8)?,
            user_agent: row.get(9)?,
        })
    }
}
