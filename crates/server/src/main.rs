//! Livepoll server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use livepoll_api::{AppState, app};
use livepoll_common::Config;
use livepoll_core::{
    MemoryPollStore, PollService, PollStoreService, RetryPolicy, RoomRegistry, SqlPollStore,
    TokenVerifier, VoteIntake, VoteLedger,
};
use livepoll_db::repositories::{PollRepository, PollVoteRepository};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Pick the poll store: `PostgreSQL` when a URL is configured, memory otherwise.
async fn build_store(config: &Config) -> Result<PollStoreService, Box<dyn std::error::Error>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database URL configured, polls are kept in memory");
        return Ok(Arc::new(MemoryPollStore::new()));
    };

    let db = livepoll_db::init(url, &config.database).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    livepoll_db::migrate(&db).await?;
    info!("Migrations completed");

    let db = Arc::new(db);
    Ok(Arc::new(SqlPollStore::new(
        PollRepository::new(Arc::clone(&db)),
        PollVoteRepository::new(db),
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livepoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting livepoll server...");

    // Load configuration
    let config = Config::load()?;

    let store = build_store(&config).await?;

    // Vote pipeline
    let rooms = RoomRegistry::new();
    let ledger = VoteLedger::new(store, rooms, config.voting.lock_timeout());
    let intake = VoteIntake::new(
        ledger.clone(),
        TokenVerifier::new(&config.auth.jwt_secret),
        RetryPolicy::from(&config.voting),
    );
    let state = AppState::new(PollService::new(ledger), intake);

    let app = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
