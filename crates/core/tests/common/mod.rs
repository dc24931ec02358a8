//! Shared harness for core integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use trove_core::admission::QueueAdmission;
use trove_core::connectivity::{BackoffPolicy, RuntimeFlags};
use trove_core::notify::Notifier;
use trove_core::orchestrator::{
    AnimeStrategy, MangaStrategy, Orchestrator, OrchestratorConfig, Pacing, Signals,
};
use trove_core::provider::ProviderRegistry;
use trove_core::store::SqliteStore;
use trove_core::testing::{MockCatalog, MockChapterSource, MockDownloadEngine, MockProvider};

pub const PROVIDER: &str = "nyaa";
pub const CHAPTER_SOURCE: &str = "mangadex";

/// Mocks plus a real store on a temp database.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub catalog: Arc<MockCatalog>,
    pub provider: Arc<MockProvider>,
    pub chapters: Arc<MockChapterSource>,
    pub engine: Arc<MockDownloadEngine>,
    pub flags: RuntimeFlags,
    pub notifier: Notifier,
    pub config: OrchestratorConfig,
    dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store =
            Arc::new(SqliteStore::new(&dir.path().join("trove.db")).expect("Failed to open store"));
        let config = OrchestratorConfig {
            base_destination: Some(dir.path().join("library").display().to_string()),
            queue_poll_interval_ms: 20,
            ..Default::default()
        };

        Self {
            store,
            catalog: Arc::new(MockCatalog::new()),
            provider: Arc::new(MockProvider::named(PROVIDER)),
            chapters: Arc::new(MockChapterSource::named(CHAPTER_SOURCE)),
            engine: Arc::new(MockDownloadEngine::new()),
            flags: RuntimeFlags::new(),
            notifier: Notifier::default(),
            config,
            dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write an input file and return its path as a string.
    pub fn write_input(&self, name: &str, contents: &str) -> String {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("Failed to write input");
        path.display().to_string()
    }

    pub fn providers(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register_search(self.provider.clone());
        registry.register_chapter_source(self.chapters.clone());
        registry
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            threshold: 3,
            offline_poll_interval: Duration::from_millis(10),
            cooldown: Duration::from_millis(10),
        }
    }

    pub fn anime(&self, pacing: Pacing) -> Orchestrator<AnimeStrategy> {
        let strategy = AnimeStrategy::new(
            self.catalog.clone(),
            self.providers(),
            self.engine.clone(),
            self.store.clone(),
            self.store.clone(),
            &self.config,
        )
        .with_pacing(pacing);
        Orchestrator::new(
            strategy,
            self.store.clone(),
            Signals::from_flags(&self.flags),
            self.notifier.clone(),
            self.backoff(),
        )
    }

    pub fn manga(&self, pacing: Pacing, queue_cap: u64) -> Orchestrator<MangaStrategy> {
        let admission = QueueAdmission::new(
            self.store.clone(),
            queue_cap,
            self.config.queue_poll_interval(),
        );
        let strategy = MangaStrategy::new(
            self.catalog.clone(),
            self.providers(),
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            admission,
            &self.config,
        )
        .with_pacing(pacing);
        Orchestrator::new(
            strategy,
            self.store.clone(),
            Signals::from_flags(&self.flags),
            self.notifier.clone(),
            self.backoff(),
        )
    }
}

/// Pacing with a long pause between items, to catch a run mid-batch.
pub fn slow_pacing() -> Pacing {
    Pacing {
        success_delay: Duration::from_secs(30),
        failure_delay: Duration::from_secs(30),
        skip_delay: Duration::from_secs(30),
        ..Pacing::immediate()
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
