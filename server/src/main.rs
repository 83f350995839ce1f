//! Exam seating HTTP server.
//!
//! Wires the Postgres seat store, the runtime services and the axum router,
//! runs housekeeping sweeps in the background and shuts down gracefully on
//! Ctrl+C or SIGTERM.

mod config;

use config::Config;
use exam_seating_core::environment::{Clock, SystemClock};
use exam_seating_core::verification::NoticeVerifier;
use exam_seating_postgres::PostgresSeatStore;
use exam_seating_runtime::metrics::MetricsServer;
use exam_seating_runtime::{Engine, EngineConfig, RetryPolicy};
use exam_seating_web::{router, AppState};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exam_seating=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting exam seating server");

    let config = Config::from_env()?;
    info!(
        http = %config.http_addr(),
        metrics = %config.metrics_addr(),
        merchant_id = %config.gateway.merchant_id,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr().parse()?);
    if let Err(e) = metrics.start() {
        warn!(error = %e, "Metrics exporter not started");
    }

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await?;
    let store = PostgresSeatStore::from_pool(pool).with_lock_timeout(config.lock_timeout());
    store.migrate().await?;
    info!("Database ready");

    let engine_config = EngineConfig {
        index_prefix: config.engine.index_prefix.clone(),
        default_commission: config.engine.default_commission,
        pending_hold: chrono::Duration::hours(config.engine.pending_hold_hours),
        retry: RetryPolicy::builder()
            .max_retries(config.engine.allocation_max_retries)
            .build(),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let verifier = NoticeVerifier::new(
        config.gateway.merchant_id.clone(),
        &config.gateway.merchant_secret,
    );
    let engine = Engine::new(Arc::new(store), clock, verifier, engine_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = engine.sweeper();
    let sweep_interval = Duration::from_secs(config.engine.sweep_interval_secs);
    let sweep_handle = tokio::spawn(async move { sweeper.run(sweep_interval, shutdown_rx).await });

    let app = router(AppState::new(engine));
    let listener = tokio::net::TcpListener::bind(config.http_addr()).await?;
    info!(address = %config.http_addr(), "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let drain = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(drain, sweep_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Sweep task failed"),
        Err(_) => warn!("Sweep task did not stop within the shutdown timeout"),
    }

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl+C (SIGINT) or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
