//! Subscriber Server Binary
//!
//! Runs the subscriber HTTP server and resumes any registrations left
//! pending by a previous run.

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;
use subscriber_registry::{HttpRegistryClient, RegistryClient};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use subscriber_server::{
    create_router, AppState, KeysetStore, MemoryStore, StoredKeyProvider, SubscriberConfig,
    SubscriptionService, SubscriptionStore,
};

type Stores = (Arc<dyn SubscriptionStore>, Arc<dyn KeysetStore>);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SubscriberConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Subscriber server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SubscriberConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (store, keysets) = open_stores(&config).await?;
    let registry = Arc::new(HttpRegistryClient::new(config.registry.clone())?);
    let keys = Arc::new(StoredKeyProvider::new(keysets));

    let service = SubscriptionService::new(
        store,
        registry.clone(),
        keys,
        config.registry_encr_public_key.clone(),
        config.retry.clone(),
    );

    info!(
        registry = %registry.description(),
        registry_url = %config.registry.base_url,
        callback_paths = ?config.callback_paths,
        "Starting subscriber server"
    );

    service.resume_pending().await?;

    let state = Arc::new(AppState {
        service,
        callback_paths: config.callback_paths.clone(),
    });
    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Subscriber listening");

    let shutdown_timeout = config.shutdown_timeout;
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // Bound draining once the signal has fired
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => warn!(timeout_secs = shutdown_timeout.as_secs(), "Shutdown timed out, dropping connections"),
    }

    info!("Subscriber server stopped");
    Ok(())
}

/// Subscription and keyset storage share one backend
#[cfg(feature = "postgres")]
async fn open_stores(config: &SubscriberConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(url) => {
            let store = Arc::new(subscriber_server::PostgresStore::new(url).await?);
            let stores: Stores = (store.clone(), store);
            Ok(stores)
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            let stores: Stores = (store.clone(), store);
            Ok(stores)
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_stores(config: &SubscriberConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory store");
    }
    let store = Arc::new(MemoryStore::new());
    let stores: Stores = (store.clone(), store);
    Ok(stores)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Graceful shutdown initiated");
}
