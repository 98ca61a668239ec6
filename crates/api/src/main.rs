use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqtrail_api::audit::{AuditInterceptor, AuditWriter, AuditWriterConfig, PgAuditSink};
use reqtrail_api::background::audit_retention;
use reqtrail_api::config::ServerConfig;
use reqtrail_api::router::build_app_router;
use reqtrail_api::routes;
use reqtrail_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.audit.log_level.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = reqtrail_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    reqtrail_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    reqtrail_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Audit writer ---
    let (writer, writer_handle) = AuditWriter::spawn(
        Arc::new(PgAuditSink::new(pool.clone())),
        AuditWriterConfig {
            queue_capacity: config.audit.queue_capacity,
            concurrency: config.audit.writer_concurrency,
        },
    );

    let registry = routes::audited_routes();
    tracing::info!(
        audited_routes = registry.len(),
        excluded_patterns = config.audit.exclude_routes.len(),
        "Audit interceptor configured"
    );
    let interceptor = AuditInterceptor::new(&config.audit, registry, writer)
        .expect("Invalid AUDIT_EXCLUDE_ROUTES pattern");

    // --- Audit retention ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(audit_retention::run(
        pool.clone(),
        config.audit.retention_days,
        Duration::from_secs(config.audit.cleanup_interval_secs),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config, interceptor);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Audit retention job stopped");

    // The router (and with it the last writer handle) was consumed by
    // `serve`; the writer now drains whatever is still queued.
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, writer_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = drain.as_secs(),
            "Audit writer did not drain in time; pending records lost"
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
