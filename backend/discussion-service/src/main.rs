//! discussion-service binary: owns the schema and serves `/health` and `/ready`.
//!
//! It runs migrations and health checks only. API layers embed the engine
//! through the library (`DiscussionEngine`) with the same `Config`.

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use discussion_service::config::Config;
use discussion_service::repository::PgDiscussionStore;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn ready(store: web::Data<Arc<PgDiscussionStore>>) -> impl Responder {
    match store.health_check().await {
        Ok(()) => HttpResponse::Ok().body("READY"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().body("NOT READY")
        }
    }
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,discussion_service=debug,sqlx=warn".into());
    let json_layer = json_logs.then(|| fmt::layer().json());
    let text_layer = (!json_logs).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.app.json_logs);

    info!("Starting discussion-service v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: env={}, http_port={}",
        config.app.env, config.app.http_port
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    // Verify database connection
    sqlx::query("SELECT 1")
        .execute(&pg_pool)
        .await
        .context("Failed to verify database connection")?;
    info!("Database pool created and verified");

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let store = Arc::new(PgDiscussionStore::new(pg_pool.clone()));

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("HTTP health checks: http://{}", http_addr);

    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(store.clone()))
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/ready", web::get().to(ready))
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();

    let handle = http_server.handle();
    let server_task = tokio::spawn(http_server);

    shutdown_signal().await;
    info!("Shutdown signal received, stopping HTTP server");
    handle.stop(true).await;

    server_task
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server error")?;

    pg_pool.close().await;
    info!("discussion-service stopped");
    Ok(())
}
