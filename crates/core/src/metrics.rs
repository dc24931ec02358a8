//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Batch runs (starts, stops, completions, per-item outcomes)
//! - Connectivity handling (transient errors, waits)
//! - Lookup caches

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};

// =============================================================================
// Batch Runs
// =============================================================================

/// Runs by lifecycle event.
pub static RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_runs_total", "Batch run lifecycle events"),
        &["job", "result"], // result: "started", "stopped", "completed"
    )
    .unwrap()
});

/// Items handled by outcome.
pub static ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_items_total", "Work items handled by batch runs"),
        &["job", "outcome"], // outcome: "processed", "failed", "skipped"
    )
    .unwrap()
});

// =============================================================================
// Connectivity
// =============================================================================

/// Collaborator errors classified as transient.
pub static TRANSIENT_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trove_transient_errors_total",
            "Collaborator errors classified as transient",
        ),
        &["job"],
    )
    .unwrap()
});

/// Interrupt waits entered.
pub static WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_waits_total", "Waits entered by batch runs"),
        &["job", "reason"], // reason: "offline", "cooldown", "queue", "playback"
    )
    .unwrap()
});

// =============================================================================
// Caches
// =============================================================================

pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_cache_lookups_total", "TTL cache lookups"),
        &["result"], // "hit", "miss"
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RUNS.clone()),
        Box::new(ITEMS.clone()),
        Box::new(TRANSIENT_ERRORS.clone()),
        Box::new(WAITS.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
    ]
}
