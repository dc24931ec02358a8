//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full router with
//! mock collaborators injected, so every endpoint can be exercised
//! in-process without a catalog, indexer or download client.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use trove_core::admission::QueueAdmission;
use trove_core::config::{DatabaseConfig, ProviderConfig, ProviderKind};
use trove_core::connectivity::{BackoffPolicy, RuntimeFlags};
use trove_core::notify::Notifier;
use trove_core::orchestrator::{
    AnimeStrategy, MangaStrategy, Orchestrator, OrchestratorConfig, Pacing, RecheckConfig,
    RecheckScheduler, Signals,
};
use trove_core::provider::ProviderRegistry;
use trove_core::store::SqliteStore;
use trove_core::testing::{MockCatalog, MockChapterSource, MockDownloadEngine, MockProvider};
use trove_core::Config;
use trove_server::state::AppState;

/// Re-export fixtures for test convenience
pub use trove_core::testing::fixtures;

pub const PROVIDER: &str = "nyaa";
pub const CHAPTER_SOURCE: &str = "mangadex";

/// Test fixture with the full router and controllable mocks.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_status() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.get("/api/v1/jobs/anime/status").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<SqliteStore>,
    /// Mock catalog - configure anime and manga entries
    pub catalog: Arc<MockCatalog>,
    /// Mock release provider - configure search results
    pub provider: Arc<MockProvider>,
    /// Mock chapter source - configure chapter lists
    pub chapters: Arc<MockChapterSource>,
    /// Mock download engine - inspect enqueued links
    pub engine: Arc<MockDownloadEngine>,
    /// Temporary directory for the database and input files
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let catalog = Arc::new(MockCatalog::new());
        let provider = Arc::new(MockProvider::named(PROVIDER));
        let chapters = Arc::new(MockChapterSource::named(CHAPTER_SOURCE));
        let engine = Arc::new(MockDownloadEngine::new());

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            providers: vec![ProviderConfig {
                name: PROVIDER.to_string(),
                kind: ProviderKind::Torznab,
                url: "http://localhost:9117".to_string(),
                api_key: Some("super-secret-key".to_string()),
                indexer: None,
                timeout_secs: 30,
                language: None,
            }],
            orchestrator: OrchestratorConfig {
                base_destination: Some(temp_dir.path().join("library").display().to_string()),
                queue_poll_interval_ms: 20,
                ..Default::default()
            },
            recheck: RecheckConfig {
                initial_delay_secs: 3600,
                item_delay_ms: 0,
                chapter_delay_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteStore::new(&db_path).expect("Failed to create store"));

        let mut providers = ProviderRegistry::new();
        providers.register_search(provider.clone());
        providers.register_chapter_source(chapters.clone());

        let flags = RuntimeFlags::new();
        let signals = Signals::from_flags(&flags);
        let notifier = Notifier::default();
        let backoff = BackoffPolicy {
            threshold: 3,
            offline_poll_interval: Duration::from_millis(10),
            cooldown: Duration::from_millis(10),
        };

        let anime = Orchestrator::new(
            AnimeStrategy::new(
                catalog.clone(),
                providers.clone(),
                engine.clone(),
                store.clone(),
                store.clone(),
                &config.orchestrator,
            )
            .with_pacing(Pacing::immediate()),
            store.clone(),
            signals.clone(),
            notifier.clone(),
            backoff.clone(),
        );

        let admission = QueueAdmission::new(
            store.clone(),
            config.orchestrator.queue_cap,
            config.orchestrator.queue_poll_interval(),
        );
        let manga = Orchestrator::new(
            MangaStrategy::new(
                catalog.clone(),
                providers.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                admission,
                &config.orchestrator,
            )
            .with_pacing(Pacing::immediate()),
            store.clone(),
            signals,
            notifier.clone(),
            backoff.clone(),
        );

        let recheck = RecheckScheduler::new(
            catalog.clone(),
            providers,
            store.clone(),
            store.clone(),
            notifier.clone(),
            Arc::new(flags.clone()),
            backoff,
            config.recheck.clone(),
        );

        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            Arc::new(anime),
            Arc::new(manga),
            recheck,
            flags,
            notifier,
        ));
        let router = trove_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            store,
            catalog,
            provider,
            chapters,
            engine,
            temp_dir,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Write an input file and return its path as a string.
    pub fn write_input(&self, name: &str, contents: &str) -> String {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("Failed to write input");
        path.display().to_string()
    }

    /// Poll a job's status until it is no longer running.
    pub async fn wait_until_idle(&self, job: &str) -> Value {
        let path = format!("/api/v1/jobs/{}/status", job);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["running"] == false {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} run did not finish in time", job);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
