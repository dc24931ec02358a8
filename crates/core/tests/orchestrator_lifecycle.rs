//! Batch run lifecycle integration tests.
//!
//! Runs go through the real orchestrator and SQLite store with mocked
//! catalog, providers and download engine:
//! start -> fetch -> search -> enqueue -> checkpoint -> finish / stop / resume

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{slow_pacing, wait_for, Harness, CHAPTER_SOURCE, PROVIDER};
use tokio_test::assert_ok;
use trove_core::admission::QueueAdmission;
use trove_core::notify::NotificationLevel;
use trove_core::orchestrator::{
    association_key, title_association_key, MangaStrategy, Orchestrator, OrchestratorError,
    Pacing, Phase, Signals, StartRequest,
};
use trove_core::store::{
    AssociationStore, ChapterQueueStore, CheckpointStore, JobKind, LibraryIndex, QueuedChapter,
    ReadingListStore, SqliteStore, StoreError,
};
use trove_core::testing::fixtures;

const TIMEOUT: Duration = Duration::from_secs(5);

fn request(source: &str, provider: &str) -> StartRequest {
    StartRequest {
        source: Some(source.to_string()),
        provider: Some(provider.to_string()),
        destination: None,
        resume: false,
    }
}

fn resume() -> StartRequest {
    StartRequest {
        resume: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_anime_batch_processes_fails_and_skips() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.catalog.add_media(fixtures::anime(3, "Gamma")).await;
    h.provider
        .set_results_for("Alpha", vec![fixtures::candidate("[Grp] Alpha S1 1080p Batch", 20)])
        .await;
    h.store.save_association("deadbeef", 3).unwrap();
    let source = h.write_input("anime.json", r#"{"deadEntries": ["1", 2, 3]}"#);

    let mut notifications = h.notifier.subscribe();
    let orch = h.anime(Pacing::immediate());
    assert_ok!(orch.start(request(&source, PROVIDER)).await);
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert_eq!(status.phase, Phase::Idle);
    assert!(!status.can_resume);
    assert_eq!(status.current_index, 3);
    assert_eq!(status.outcomes.processed.len(), 1);
    assert_eq!(status.outcomes.processed[0].title, "Alpha");
    assert_eq!(status.outcomes.processed[0].availability, Some(20));
    assert_eq!(status.counters.queued_units, 1);
    assert_eq!(status.outcomes.failed.len(), 1);
    assert_eq!(status.outcomes.failed[0].reason, "Not found in catalog");
    assert_eq!(status.outcomes.skipped.len(), 1);
    assert_eq!(status.outcomes.skipped[0].reason, "Content already associated");

    // Skipped before the catalog was asked.
    assert_eq!(h.catalog.fetch_calls().await, vec![1, 2]);

    let enqueued = h.engine.enqueued().await;
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].destination, h.path("library").join("Alpha"));
    assert!(enqueued[0].links[0].starts_with("magnet:?xt=urn:btih:"));
    assert_eq!(h.store.associations_for_media(1).unwrap().len(), 1);

    assert!(h.store.load_checkpoint(JobKind::Anime).unwrap().is_none());

    let first = notifications.recv().await.unwrap();
    assert_eq!(first.message, "Starting anime batch for 3 items");
    let last = notifications.recv().await.unwrap();
    assert_eq!(last.level, NotificationLevel::Success);
    assert_eq!(last.message, "anime batch finished: 1 processed, 1 failed, 1 skipped");
}

#[tokio::test]
async fn test_stop_keeps_checkpoint_and_resume_finishes() {
    let h = Harness::new();
    for (id, title) in [(1, "Alpha"), (2, "Beta"), (3, "Gamma")] {
        h.catalog.add_media(fixtures::anime(id, title)).await;
        h.provider
            .set_results_for(title, vec![fixtures::candidate(&format!("{} 1080p", title), 10)])
            .await;
    }
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2, 3]}"#);

    let orch = h.anime(slow_pacing());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(
        wait_for(TIMEOUT, || {
            let s = orch.status();
            s.phase == Phase::Waiting && s.outcomes.processed.len() == 1
        })
        .await,
        "Run should pause after the first item"
    );

    orch.stop().unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert!(status.can_resume);
    assert_eq!(status.current_index, 1);
    assert_eq!(status.total_count, 3);

    let checkpoint = h.store.load_checkpoint(JobKind::Anime).unwrap().unwrap();
    assert!(checkpoint.active);
    assert_eq!(checkpoint.current_index, 1);
    assert_eq!(checkpoint.provider, PROVIDER);
    assert_eq!(checkpoint.outcomes.processed.len(), 1);

    // A fresh orchestrator picks the run up from the store.
    let resumed = h.anime(Pacing::immediate());
    assert!(resumed.status().can_resume);
    resumed.start(resume()).await.unwrap();
    assert!(wait_for(TIMEOUT, || !resumed.status().running).await);

    let status = resumed.status();
    assert_eq!(status.outcomes.processed.len(), 3);
    assert_eq!(status.counters.queued_units, 3);
    assert_eq!(h.catalog.fetch_calls().await, vec![1, 2, 3]);
    assert!(h.store.load_checkpoint(JobKind::Anime).unwrap().is_none());
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2]}"#);

    let orch = h.anime(slow_pacing());
    orch.start(request(&source, PROVIDER)).await.unwrap();

    let err = orch.start(request(&source, PROVIDER)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyRunning(JobKind::Anime)));

    let err = orch.reset().unwrap_err();
    assert!(matches!(err, OrchestratorError::CannotResetWhileRunning(_)));

    orch.stop().unwrap();
    assert_eq!(orch.status().phase, Phase::Stopping);
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);
}

#[tokio::test]
async fn test_repeated_stop_is_a_no_op() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2]}"#);

    let orch = h.anime(slow_pacing());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || orch.status().outcomes.processed.len() == 1).await);

    assert_ok!(orch.stop());
    assert_ok!(orch.stop());
    assert_eq!(orch.status().phase, Phase::Stopping);
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert!(status.can_resume);
    assert_eq!(status.current_index, 1);
    assert!(matches!(orch.stop(), Err(OrchestratorError::NotRunning(_))));
}

#[tokio::test]
async fn test_associated_empty_and_qualifying_items() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.catalog.add_media(fixtures::anime(2, "Beta")).await;
    h.catalog.add_media(fixtures::anime(3, "Gamma")).await;
    h.store.save_association("deadbeef", 1).unwrap();
    h.provider.set_results_for("Beta", vec![]).await;
    h.provider
        .set_results_for("Gamma", vec![fixtures::candidate("[Grp] Gamma 1080p Batch", 12)])
        .await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2, 3]}"#);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert!(!status.running);
    assert_eq!(status.outcomes.skipped.len(), 1);
    assert_eq!(status.outcomes.skipped[0].reason, "Content already associated");
    assert_eq!(status.outcomes.failed.len(), 1);
    assert_eq!(status.outcomes.failed[0].title, "Beta");
    assert_eq!(status.outcomes.failed[0].reason, "No suitable batch found");
    assert_eq!(status.outcomes.processed.len(), 1);
    assert_eq!(status.outcomes.processed[0].title, "Gamma");
    assert!(h.store.load_checkpoint(JobKind::Anime).unwrap().is_none());

    // The destination is remembered for later runs.
    assert_eq!(
        h.store.local_directory(3).unwrap(),
        Some(h.path("library").join("Gamma"))
    );
}

#[tokio::test]
async fn test_control_errors_when_idle() {
    let h = Harness::new();
    let orch = h.anime(Pacing::immediate());

    assert!(matches!(orch.stop(), Err(OrchestratorError::NotRunning(_))));
    assert!(matches!(
        orch.start(resume()).await,
        Err(OrchestratorError::NoResumableState(JobKind::Anime))
    ));
    assert!(matches!(
        orch.start(StartRequest::default()).await,
        Err(OrchestratorError::InvalidInput(_))
    ));

    let source = h.write_input("anime.json", r#"{"deadEntries": [1]}"#);
    assert!(matches!(
        orch.start(request(&source, "unknown")).await,
        Err(OrchestratorError::InvalidInput(_))
    ));
    assert!(matches!(
        orch.start(request(&h.path("missing.json").display().to_string(), PROVIDER)).await,
        Err(OrchestratorError::InvalidInput(_))
    ));

    // Failed starts release the slot.
    assert!(!orch.status().running);
    assert_ok!(orch.reset());
}

#[tokio::test]
async fn test_reset_discards_checkpoint() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2]}"#);

    let orch = h.anime(slow_pacing());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || orch.status().phase == Phase::Waiting).await);
    orch.stop().unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);
    assert!(orch.status().can_resume);

    orch.reset().unwrap();

    let status = orch.status();
    assert!(!status.can_resume);
    assert_eq!(status.current_index, 0);
    assert!(status.outcomes.processed.is_empty());
    assert!(h.store.load_checkpoint(JobKind::Anime).unwrap().is_none());
}

#[tokio::test]
async fn test_transient_catalog_error_is_retried() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.catalog.set_next_error("connection reset by peer").await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1]}"#);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert_eq!(status.outcomes.processed.len(), 1);
    assert!(status.outcomes.failed.is_empty());
    assert_eq!(h.catalog.fetch_calls().await, vec![1, 1]);
}

#[tokio::test]
async fn test_permanent_errors_fail_the_item() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.catalog.add_media(fixtures::anime(2, "Beta")).await;
    h.catalog.set_next_error("invalid media id").await;
    h.provider.set_results(vec![fixtures::candidate("Beta 1080p", 2)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1, 2]}"#);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let failed = orch.status().outcomes.failed;
    assert_eq!(failed.len(), 2);
    assert!(failed[0].reason.contains("invalid media id"));
    assert_eq!(failed[1].reason, "No candidate with at least 4 seeders");
    assert!(h.engine.enqueued().await.is_empty());
}

#[tokio::test]
async fn test_engine_refusal_fails_item() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    h.engine.set_start_result(false).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1]}"#);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let failed = orch.status().outcomes.failed;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason, "Could not start download engine");
}

#[tokio::test]
async fn test_active_download_is_reported_as_skip() {
    let h = Harness::new();
    h.store.save_association("abc123", 5).unwrap();
    h.engine.set_active(vec![fixtures::transfer("ABC123", 0.4)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [5]}"#);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let skipped = orch.status().outcomes.skipped;
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].reason, "Content already downloading");
}

#[tokio::test]
async fn test_offline_run_waits_for_connectivity() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::anime(1, "Alpha")).await;
    h.provider.set_results(vec![fixtures::candidate("Alpha 1080p", 10)]).await;
    let source = h.write_input("anime.json", r#"{"deadEntries": [1]}"#);
    h.flags.set_offline(true);

    let orch = h.anime(Pacing::immediate());
    orch.start(request(&source, PROVIDER)).await.unwrap();
    assert!(wait_for(TIMEOUT, || orch.status().phase == Phase::WaitingOffline).await);
    assert!(h.catalog.fetch_calls().await.is_empty());

    h.flags.set_offline(false);
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);
    assert_eq!(orch.status().outcomes.processed.len(), 1);
}

#[tokio::test]
async fn test_preview_samples_first_items() {
    let h = Harness::new();
    let source = h.write_input(
        "anime.json",
        r#"{"deadEntries": [1, 2, 3, 4, 5, 6, 7, "x", 0]}"#,
    );

    let preview = h.anime(Pacing::immediate()).preview_input(&source).await.unwrap();
    assert_eq!(preview.total_count, 7);
    assert_eq!(preview.sample, vec!["#1", "#2", "#3", "#4", "#5"]);
}

#[tokio::test]
async fn test_manga_batch_queues_chapters_and_records_series() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::manga(30, "Berserk")).await;
    h.chapters.set_chapters(30, fixtures::chapters(30, 3)).await;
    let source = h.write_input(
        "manga.json",
        r#"[{"title": "Berserk\nvolume list"}, {"title": "   "}]"#,
    );

    let orch = h.manga(Pacing::immediate(), 50);
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert_eq!(status.total_count, 1);
    assert_eq!(status.outcomes.processed.len(), 1);
    assert_eq!(status.outcomes.processed[0].units, 3);
    assert_eq!(status.outcomes.processed[0].selection, "3 chapters");
    assert_eq!(status.counters.queued_units, 3);

    assert_eq!(h.catalog.search_calls().await, vec!["Berserk"]);
    assert_eq!(h.store.queued_chapter_count(30).unwrap(), 3);
    assert!(h.store.is_on_reading_list(30).unwrap());
    assert!(h
        .store
        .get_association(&association_key(CHAPTER_SOURCE, 30))
        .unwrap()
        .is_some());

    // Running the same export again finds the series already handled.
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);
    let skipped = orch.status().outcomes.skipped;
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].reason, "Chapters already queued");

    // Skipped from the exported title, before any catalog call.
    assert_eq!(h.catalog.search_calls().await, vec!["Berserk"]);
    assert!(h
        .store
        .get_association(&title_association_key(CHAPTER_SOURCE, "Berserk"))
        .unwrap()
        .is_some());
}

/// Chapter queue that refuses one chapter id.
struct RejectingQueue {
    inner: Arc<SqliteStore>,
    reject: String,
}

impl ChapterQueueStore for RejectingQueue {
    fn enqueue_chapter(&self, chapter: &QueuedChapter) -> Result<bool, StoreError> {
        if chapter.chapter_id == self.reject {
            return Err(StoreError::InvalidData(format!("bad chapter {}", chapter.chapter_id)));
        }
        self.inner.enqueue_chapter(chapter)
    }

    fn count_distinct_queued_media(&self) -> Result<u64, StoreError> {
        self.inner.count_distinct_queued_media()
    }

    fn queued_chapter_count(&self, media_id: u64) -> Result<u64, StoreError> {
        self.inner.queued_chapter_count(media_id)
    }

    fn mark_chapter_downloaded(
        &self,
        provider: &str,
        media_id: u64,
        chapter_id: &str,
    ) -> Result<bool, StoreError> {
        self.inner.mark_chapter_downloaded(provider, media_id, chapter_id)
    }

    fn downloaded_chapters(&self, media_id: u64) -> Result<HashMap<String, Vec<String>>, StoreError> {
        self.inner.downloaded_chapters(media_id)
    }
}

fn manga_with_queue(h: &Harness, queue: Arc<dyn ChapterQueueStore>) -> Orchestrator<MangaStrategy> {
    let admission = QueueAdmission::new(h.store.clone(), 50, h.config.queue_poll_interval());
    let strategy = MangaStrategy::new(
        h.catalog.clone(),
        h.providers(),
        h.store.clone(),
        h.store.clone(),
        queue,
        admission,
        &h.config,
    )
    .with_pacing(Pacing::immediate());
    Orchestrator::new(
        strategy,
        h.store.clone(),
        Signals::from_flags(&h.flags),
        h.notifier.clone(),
        h.backoff(),
    )
}

#[tokio::test]
async fn test_rejected_chapter_does_not_fail_series() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::manga(30, "Berserk")).await;
    h.chapters.set_chapters(30, fixtures::chapters(30, 3)).await;
    let source = h.write_input("manga.json", r#"[{"title": "Berserk"}]"#);

    let queue = Arc::new(RejectingQueue {
        inner: h.store.clone(),
        reject: "30-ch2".to_string(),
    });
    let orch = manga_with_queue(&h, queue);
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert!(status.outcomes.failed.is_empty());
    assert_eq!(status.outcomes.processed.len(), 1);
    assert_eq!(status.outcomes.processed[0].units, 2);
    assert_eq!(status.outcomes.processed[0].selection, "2 chapters");
    assert_eq!(status.counters.queued_units, 2);

    assert_eq!(h.store.queued_chapter_count(30).unwrap(), 2);
    assert!(h.store.is_on_reading_list(30).unwrap());
    assert!(h
        .store
        .get_association(&association_key(CHAPTER_SOURCE, 30))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_series_fails_when_every_chapter_is_rejected() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::manga(30, "Berserk")).await;
    h.chapters.set_chapters(30, fixtures::chapters(30, 1)).await;
    let source = h.write_input("manga.json", r#"[{"title": "Berserk"}]"#);

    let queue = Arc::new(RejectingQueue {
        inner: h.store.clone(),
        reject: "30-ch1".to_string(),
    });
    let orch = manga_with_queue(&h, queue);
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let status = orch.status();
    assert!(status.outcomes.processed.is_empty());
    assert_eq!(status.outcomes.failed.len(), 1);
    assert!(status.outcomes.failed[0].reason.contains("bad chapter 30-ch1"));
    assert!(!h.store.is_on_reading_list(30).unwrap());
}

#[tokio::test]
async fn test_manga_waits_while_queue_is_full() {
    let h = Harness::new();
    h.catalog.add_media(fixtures::manga(30, "Berserk")).await;
    h.chapters.set_chapters(30, fixtures::chapters(30, 2)).await;
    h.store
        .enqueue_chapter(&QueuedChapter {
            provider: CHAPTER_SOURCE.to_string(),
            media_id: 99,
            chapter_id: "99-ch1".to_string(),
            chapter_number: "1".to_string(),
            title: None,
        })
        .unwrap();
    let source = h.write_input("manga.json", r#"[{"title": "Berserk"}]"#);

    let orch = h.manga(Pacing::immediate(), 1);
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || orch.status().phase == Phase::WaitingQueue).await);
    assert!(h.catalog.search_calls().await.is_empty());

    h.store
        .mark_chapter_downloaded(CHAPTER_SOURCE, 99, "99-ch1")
        .unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);
    assert_eq!(orch.status().outcomes.processed.len(), 1);
}

#[tokio::test]
async fn test_stop_while_waiting_for_queue_keeps_item() {
    let h = Harness::new();
    h.store
        .enqueue_chapter(&QueuedChapter {
            provider: CHAPTER_SOURCE.to_string(),
            media_id: 99,
            chapter_id: "99-ch1".to_string(),
            chapter_number: "1".to_string(),
            title: None,
        })
        .unwrap();
    let source = h.write_input("manga.json", r#"[{"title": "Berserk"}]"#);

    let orch = h.manga(Pacing::immediate(), 1);
    orch.start(request(&source, CHAPTER_SOURCE)).await.unwrap();
    assert!(wait_for(TIMEOUT, || orch.status().phase == Phase::WaitingQueue).await);

    orch.stop().unwrap();
    assert!(wait_for(TIMEOUT, || !orch.status().running).await);

    let checkpoint = h.store.load_checkpoint(JobKind::Manga).unwrap().unwrap();
    assert_eq!(checkpoint.current_index, 0);
    assert!(h.store.load_checkpoint(JobKind::Anime).unwrap().is_none());
}
