use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use tombola::config::Config;
use tombola::db::{AppState, create_pool, init_audit_db, init_db, queries};
use tombola::email::EmailService;
use tombola::handlers;
use tombola::models::{
    AuditAction, CreateInstantPrize, CreatePackage, CreateRaffle, RaffleStatus,
};
use tombola::payments::{DataFastClient, PayPalClient};
use tombola::util::AuditLogBuilder;

#[derive(Parser, Debug)]
#[command(name = "tombola")]
#[command(about = "Raffle storefront backend")]
struct Cli {
    /// Seed the database with a dev raffle (packages and instant prizes included)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds an active dev raffle. Only runs in dev mode and when no raffle exists.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");
    let audit_conn = state.audit.get().expect("Failed to get audit db connection");

    let existing = queries::list_raffles(&conn, None).expect("Failed to list raffles");
    if !existing.is_empty() {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let raffle = queries::create_raffle(
        &conn,
        &CreateRaffle {
            title: "Dev Raffle: Motorbike".to_string(),
            description: Some("Seeded for local testing".to_string()),
            image_url: None,
            total_numbers: 1000,
            price_per_number_cents: 100,
            currency: "usd".to_string(),
            draw_date: None,
        },
    )
    .expect("Failed to create dev raffle");

    for (quantity, price_cents, featured) in [(5, 450, false), (10, 800, true), (25, 1800, false)] {
        queries::create_package(
            &conn,
            &raffle.id,
            &CreatePackage {
                quantity,
                price_cents,
                label: Some(format!("{} numbers", quantity)),
                is_featured: featured,
            },
        )
        .expect("Failed to create dev package");
    }

    for (number_value, description) in [(7, "USD 20 cash"), (77, "USD 50 cash"), (777, "Helmet")] {
        queries::create_instant_prize(
            &conn,
            &raffle,
            &CreateInstantPrize {
                number_value,
                prize_description: description.to_string(),
                prize_amount_cents: None,
            },
        )
        .expect("Failed to create dev instant prize");
    }

    let raffle = queries::set_raffle_status(&conn, &raffle.id, RaffleStatus::Active)
        .expect("Failed to activate dev raffle")
        .expect("Dev raffle disappeared");

    AuditLogBuilder::system(&audit_conn, state.audit_log_enabled)
        .action(AuditAction::CreateRaffle)
        .resource("raffle", &raffle.id)
        .details(&serde_json::json!({ "seed": true }))
        .save()
        .expect("Failed to create audit log");

    tracing::info!("Raffle: {} (id: {})", raffle.title, raffle.id);
    tracing::info!("Packages: 5, 10 and 25 numbers");
    tracing::info!("Instant prizes on 007, 077 and 777");
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  raffle_id: {}", raffle.id);
    println!("--- END COPY ---");
    println!();
}

/// Spawns a background task that periodically expires stale pending purchases
/// and prunes old webhook replay keys. Runs every 5 minutes.
fn spawn_cleanup_task(state: AppState, pending_ttl_hours: i64) {
    const WEBHOOK_EVENT_RETENTION_DAYS: i64 = 30;

    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            let conn = match state.db.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                    continue;
                }
            };

            if pending_ttl_hours > 0 {
                let cutoff = chrono::Utc::now().timestamp() - pending_ttl_hours * 3600;
                match queries::expire_stale_pending(&conn, cutoff) {
                    Ok(0) => {}
                    Ok(count) => {
                        tracing::info!("Expired {} stale pending purchases", count);
                        if let Ok(audit_conn) = state.audit.get() {
                            AuditLogBuilder::system(&audit_conn, state.audit_log_enabled)
                                .action(AuditAction::ExpirePendingPurchases)
                                .resource("confirmation", "*")
                                .details(&serde_json::json!({
                                    "count": count,
                                    "older_than_hours": pending_ttl_hours,
                                }))
                                .save_or_warn();
                        }
                    }
                    Err(e) => tracing::warn!("Failed to expire pending purchases: {}", e),
                }
            }

            match queries::purge_old_webhook_events(&conn, WEBHOOK_EVENT_RETENTION_DAYS) {
                Ok(count) if count > 0 => {
                    tracing::debug!("Purged {} old webhook events", count);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to purge webhook events: {}", e),
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tombola=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY not set: the admin API will reject every request");
    }
    if config.hotmart_hottok.is_none() {
        tracing::warn!("HOTMART_HOTTOK not set: Hotmart webhooks will be rejected");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        base_url: config.base_url.clone(),
        audit_log_enabled: config.audit_log_enabled,
        admin_api_key: config.admin_api_key.clone(),
        hotmart_hottok: config.hotmart_hottok.clone(),
        datafast: config
            .datafast
            .as_ref()
            .map(|c| Arc::new(DataFastClient::new(c))),
        paypal: config.paypal.as_ref().map(|c| Arc::new(PayPalClient::new(c))),
        email_service: Arc::new(EmailService::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
        )),
    };

    if state.datafast.is_none() {
        tracing::info!("DataFast not configured: card checkout disabled");
    }
    if state.paypal.is_none() {
        tracing::info!("PayPal credentials not set: orders are settled without API verification");
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set TOMBOLA_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_cleanup_task(state.clone(), config.pending_ttl_hours);

    let app = Router::new()
        // Storefront (no auth, rate limited)
        .merge(handlers::public::router(config.rate_limit))
        // Payment provider callbacks (provider-specific auth)
        .merge(handlers::webhooks::router())
        // Admin API (bearer key)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Tombola server listening on {}", addr);

    // Connect info feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
