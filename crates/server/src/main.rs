use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trove_core::admission::QueueAdmission;
use trove_core::catalog::{AnilistClient, CachedCatalog, MediaCatalog};
use trove_core::config::CONFIG_PATH_ENV;
use trove_core::connectivity::RuntimeFlags;
use trove_core::download::{DisabledEngine, DownloadEngine, QBittorrentEngine};
use trove_core::notify::Notifier;
use trove_core::orchestrator::{
    AnimeStrategy, MangaStrategy, Orchestrator, RecheckScheduler, Signals,
};
use trove_core::provider::ProviderRegistry;
use trove_core::store::{JobKind, SqliteStore};
use trove_core::{load_config, validate_config};

use trove_server::api::create_router;
use trove_server::state::AppState;

/// How long shutdown waits for each run to save its checkpoint.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to open database")?,
    );
    info!("Store initialized");

    let anilist = AnilistClient::new(&config.catalog).context("Failed to create catalog client")?;
    let catalog: Arc<dyn MediaCatalog> = Arc::new(CachedCatalog::new(
        Arc::new(anilist),
        Duration::from_secs(config.catalog.cache_ttl_secs),
    ));

    let providers = ProviderRegistry::from_config(&config.providers);
    info!(
        "Providers: search {:?}, chapters {:?}",
        providers.search_names(),
        providers.chapter_source_names()
    );

    let engine: Arc<dyn DownloadEngine> = match &config.download_client {
        Some(qbit) => {
            info!("Initializing qBittorrent engine at {}", qbit.url);
            Arc::new(QBittorrentEngine::new(qbit.clone()))
        }
        None => {
            warn!("No download client configured, anime runs will fail their items");
            Arc::new(DisabledEngine)
        }
    };

    let flags = RuntimeFlags::new();
    let signals = Signals::from_flags(&flags);
    let notifier = Notifier::default();
    let orchestrator_config = &config.orchestrator;

    let anime = Orchestrator::new(
        AnimeStrategy::new(
            Arc::clone(&catalog),
            providers.clone(),
            engine,
            store.clone(),
            store.clone(),
            orchestrator_config,
        ),
        store.clone(),
        signals.clone(),
        notifier.clone(),
        orchestrator_config.backoff_policy(JobKind::Anime),
    );

    let admission = QueueAdmission::new(
        store.clone(),
        orchestrator_config.queue_cap,
        orchestrator_config.queue_poll_interval(),
    );
    let manga = Orchestrator::new(
        MangaStrategy::new(
            Arc::clone(&catalog),
            providers.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            admission,
            orchestrator_config,
        ),
        store.clone(),
        signals,
        notifier.clone(),
        orchestrator_config.backoff_policy(JobKind::Manga),
    );

    let recheck = RecheckScheduler::new(
        catalog,
        providers,
        store.clone(),
        store.clone(),
        notifier.clone(),
        Arc::new(flags.clone()),
        orchestrator_config.backoff_policy(JobKind::Manga),
        config.recheck.clone(),
    );
    if config.recheck.enabled {
        recheck.start();
    } else {
        info!("Recheck scheduler disabled in config");
    }

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        store,
        Arc::new(anime),
        Arc::new(manga),
        recheck,
        flags,
        notifier,
    ));

    let app = create_router(Arc::clone(&state));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    state.recheck().stop();
    for job in state.jobs() {
        if job.status().running {
            info!(job = %job.job(), "Stopping run");
            if !job.stop_and_wait(SHUTDOWN_TIMEOUT).await {
                warn!(job = %job.job(), "Run did not stop in time");
            }
        }
    }
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
