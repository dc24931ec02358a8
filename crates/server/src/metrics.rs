//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the trove server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket connection metrics
//! - Job and queue state (collected dynamically)
//!
//! Counters owned by the core (runs, items, waits) are registered here too.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;
use trove_core::store::{ChapterQueueStore, ReadingListStore};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "trove_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "trove_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "trove_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "trove_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "trove_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics (collected dynamically)
// =============================================================================

/// Whether a batch run is active (1) or not (0), per job kind.
pub static JOB_RUNNING: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("trove_job_running", "Whether a batch run is active"),
        &["job"],
    )
    .unwrap()
});

/// Items completed by the current or saved run, per job kind.
pub static JOB_PROGRESS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("trove_job_progress_items", "Items completed by the current run"),
        &["job"],
    )
    .unwrap()
});

/// Series on the reading list.
pub static READING_LIST_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("trove_reading_list_size", "Series on the reading list").unwrap()
});

/// Distinct media with chapters still queued.
pub static QUEUED_MEDIA: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "trove_queued_media",
        "Distinct media with chapters waiting in the queue",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Jobs and queue
    registry.register(Box::new(JOB_RUNNING.clone())).unwrap();
    registry.register(Box::new(JOB_PROGRESS.clone())).unwrap();
    registry
        .register(Box::new(READING_LIST_SIZE.clone()))
        .unwrap();
    registry.register(Box::new(QUEUED_MEDIA.clone())).unwrap();

    // Core metrics (runs, items, transient errors, waits, cache)
    for metric in trove_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh gauges from current application state before encoding.
pub fn collect_dynamic_metrics(state: &AppState) {
    for job in state.jobs() {
        let status = job.status();
        let label = job.job().as_str();
        JOB_RUNNING
            .with_label_values(&[label])
            .set(i64::from(status.running));
        JOB_PROGRESS
            .with_label_values(&[label])
            .set(status.current_index as i64);
    }

    match state.store().reading_list() {
        Ok(entries) => READING_LIST_SIZE.set(entries.len() as i64),
        Err(e) => warn!("Failed to read reading list for metrics: {}", e),
    }
    match state.store().count_distinct_queued_media() {
        Ok(count) => QUEUED_MEDIA.set(count as i64),
        Err(e) => warn!("Failed to count queued media for metrics: {}", e),
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{40}").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());
static ASSOCIATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/associations/[^/]+$").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = HASH_RE.replace_all(&result, "{hash}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    let result = ASSOCIATION_RE.replace_all(&result, "/associations/{key}");
    result.to_string()
}
