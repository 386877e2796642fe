use rusqlite::Connection;

/// Initialize the main database schema (everything except audit logs)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Raffles (ticket pools 1..=total_numbers)
        -- numbers_sold is recounted inside the same transaction that inserts tickets
        CREATE TABLE IF NOT EXISTS raffles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            image_url TEXT,
            total_numbers INTEGER NOT NULL CHECK (total_numbers > 0),
            price_per_number_cents INTEGER NOT NULL CHECK (price_per_number_cents >= 0),
            currency TEXT NOT NULL DEFAULT 'usd',
            numbers_sold INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'active', 'closed')),
            draw_date INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_raffles_status ON raffles(status);

        -- Packages (pricing tiers)
        CREATE TABLE IF NOT EXISTS packages (
            id TEXT PRIMARY KEY,
            raffle_id TEXT NOT NULL REFERENCES raffles(id) ON DELETE CASCADE,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            label TEXT,
            is_featured INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            UNIQUE(raffle_id, quantity)
        );

        -- Purchase confirmations (pending -> paid | cancelled)
        CREATE TABLE IF NOT EXISTS purchase_confirmations (
            id TEXT PRIMARY KEY,
            raffle_id TEXT NOT NULL REFERENCES raffles(id) ON DELETE CASCADE,
            buyer_name TEXT NOT NULL,
            buyer_email TEXT NOT NULL,
            buyer_phone TEXT,
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'cancelled')),
            payment_provider TEXT NOT NULL CHECK (payment_provider IN ('datafast', 'paypal', 'hotmart', 'manual')),
            payment_reference TEXT,
            amount_paid_cents INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_confirmations_email_status ON purchase_confirmations(buyer_email, status, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_confirmations_raffle ON purchase_confirmations(raffle_id, status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_confirmations_reference
            ON purchase_confirmations(payment_provider, payment_reference)
            WHERE payment_reference IS NOT NULL;

        -- Sold numbers. The unique index is what keeps two buyers from sharing a number.
        CREATE TABLE IF NOT EXISTS ticket_numbers (
            id TEXT PRIMARY KEY,
            raffle_id TEXT NOT NULL REFERENCES raffles(id) ON DELETE CASCADE,
            number_value INTEGER NOT NULL CHECK (number_value >= 1),
            confirmation_id TEXT NOT NULL REFERENCES purchase_confirmations(id) ON DELETE CASCADE,
            buyer_email TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(raffle_id, number_value)
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_numbers_confirmation ON ticket_numbers(confirmation_id);
        CREATE INDEX IF NOT EXISTS idx_ticket_numbers_email ON ticket_numbers(buyer_email);

        -- Instant-win numbers
        CREATE TABLE IF NOT EXISTS instant_prizes (
            id TEXT PRIMARY KEY,
            raffle_id TEXT NOT NULL REFERENCES raffles(id) ON DELETE CASCADE,
            number_value INTEGER NOT NULL CHECK (number_value >= 1),
            prize_description TEXT NOT NULL,
            prize_amount_cents INTEGER,
            confirmation_id TEXT REFERENCES purchase_confirmations(id) ON DELETE SET NULL,
            claimed_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(raffle_id, number_value)
        );

        -- Storefront settings (single row, id = 1)
        CREATE TABLE IF NOT EXISTS site_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            site_name TEXT NOT NULL,
            contact_whatsapp TEXT,
            support_email TEXT,
            email_enabled INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO site_settings (id, site_name, email_enabled, updated_at)
            VALUES (1, 'Tombola', 1, strftime('%s', 'now'));

        -- Replay prevention for payment webhooks
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (provider, event_id)
        );
        "#,
    )?;
    Ok(())
}

/// Initialize the audit database schema (separate file to isolate growth)
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('admin', 'webhook', 'public', 'system')),
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )?;
    Ok(())
}
