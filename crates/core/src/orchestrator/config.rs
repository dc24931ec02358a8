//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connectivity::BackoffPolicy;
use crate::store::JobKind;

/// Batch job settings shared by every job kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Minimum seeders for a release to be considered.
    #[serde(default = "default_min_availability")]
    pub min_availability: u32,

    /// Base directory for new downloads when no destination is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_destination: Option<String>,

    /// Library roots, used when neither a destination nor a base is set.
    #[serde(default)]
    pub library_roots: Vec<String>,

    /// How often to re-check connectivity while offline (milliseconds).
    #[serde(default = "default_offline_poll")]
    pub offline_poll_interval_ms: u64,

    /// Consecutive transient errors tolerated before cooling down.
    #[serde(default = "default_threshold")]
    pub transient_error_threshold: u32,

    /// Maximum distinct series waiting in the chapter queue.
    #[serde(default = "default_queue_cap")]
    pub queue_cap: u64,

    /// How often to re-check a full queue (milliseconds).
    #[serde(default = "default_queue_poll")]
    pub queue_poll_interval_ms: u64,

    #[serde(default)]
    pub anime: PacingOverrides,

    #[serde(default)]
    pub manga: PacingOverrides,
}

fn default_min_availability() -> u32 {
    4
}

fn default_offline_poll() -> u64 {
    5000
}

fn default_threshold() -> u32 {
    3
}

fn default_queue_cap() -> u64 {
    50
}

fn default_queue_poll() -> u64 {
    10_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_availability: default_min_availability(),
            base_destination: None,
            library_roots: Vec::new(),
            offline_poll_interval_ms: default_offline_poll(),
            transient_error_threshold: default_threshold(),
            queue_cap: default_queue_cap(),
            queue_poll_interval_ms: default_queue_poll(),
            anime: PacingOverrides::default(),
            manga: PacingOverrides::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn pacing(&self, job: JobKind) -> Pacing {
        match job {
            JobKind::Anime => Pacing::anime().with_overrides(&self.anime),
            JobKind::Manga => Pacing::manga().with_overrides(&self.manga),
        }
    }

    pub fn backoff_policy(&self, job: JobKind) -> BackoffPolicy {
        BackoffPolicy {
            threshold: self.transient_error_threshold,
            offline_poll_interval: Duration::from_millis(self.offline_poll_interval_ms),
            cooldown: self.pacing(job).cooldown,
        }
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }
}

/// Optional per-kind timing overrides, all in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacingOverrides {
    pub pre_search_delay_ms: Option<u64>,
    pub success_delay_ms: Option<u64>,
    pub failure_delay_ms: Option<u64>,
    pub skip_delay_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub unit_delay_ms: Option<u64>,
    pub playback_unit_delay_ms: Option<u64>,
    /// 0 disables the playback throttle.
    pub playback_throttle_ms: Option<u64>,
    pub playback_search_throttle_ms: Option<u64>,
}

/// Delays applied by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub pre_search_delay: Duration,
    pub success_delay: Duration,
    pub failure_delay: Duration,
    pub skip_delay: Duration,
    pub cooldown: Duration,
    /// Spacing between units (chapters) of one item.
    pub unit_delay: Duration,
    pub playback_unit_delay: Duration,
    /// Pause before an item while playback is active.
    pub playback_throttle: Option<Duration>,
    /// Pause before searching while playback is active.
    pub playback_search_throttle: Option<Duration>,
}

impl Pacing {
    pub fn anime() -> Self {
        Self {
            pre_search_delay: Duration::from_secs(1),
            success_delay: Duration::from_secs(3),
            failure_delay: Duration::from_secs(2),
            skip_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(10),
            unit_delay: Duration::ZERO,
            playback_unit_delay: Duration::ZERO,
            playback_throttle: None,
            playback_search_throttle: None,
        }
    }

    pub fn manga() -> Self {
        Self {
            pre_search_delay: Duration::from_secs(1),
            success_delay: Duration::from_secs(5),
            failure_delay: Duration::from_secs(2),
            skip_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(5),
            unit_delay: Duration::from_millis(400),
            playback_unit_delay: Duration::from_secs(2),
            playback_throttle: Some(Duration::from_secs(5)),
            playback_search_throttle: Some(Duration::from_secs(3)),
        }
    }

    /// No delays at all.
    pub fn immediate() -> Self {
        Self {
            pre_search_delay: Duration::ZERO,
            success_delay: Duration::ZERO,
            failure_delay: Duration::ZERO,
            skip_delay: Duration::ZERO,
            cooldown: Duration::ZERO,
            unit_delay: Duration::ZERO,
            playback_unit_delay: Duration::ZERO,
            playback_throttle: None,
            playback_search_throttle: None,
        }
    }

    pub fn with_overrides(mut self, o: &PacingOverrides) -> Self {
        let ms = Duration::from_millis;
        if let Some(v) = o.pre_search_delay_ms {
            self.pre_search_delay = ms(v);
        }
        if let Some(v) = o.success_delay_ms {
            self.success_delay = ms(v);
        }
        if let Some(v) = o.failure_delay_ms {
            self.failure_delay = ms(v);
        }
        if let Some(v) = o.skip_delay_ms {
            self.skip_delay = ms(v);
        }
        if let Some(v) = o.cooldown_ms {
            self.cooldown = ms(v);
        }
        if let Some(v) = o.unit_delay_ms {
            self.unit_delay = ms(v);
        }
        if let Some(v) = o.playback_unit_delay_ms {
            self.playback_unit_delay = ms(v);
        }
        if let Some(v) = o.playback_throttle_ms {
            self.playback_throttle = (v > 0).then(|| ms(v));
        }
        if let Some(v) = o.playback_search_throttle_ms {
            self.playback_search_throttle = (v > 0).then(|| ms(v));
        }
        self
    }
}

/// Periodic reading-list recheck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecheckConfig {
    /// Start the scheduler with the server.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_recheck_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Pause between two media of one pass (milliseconds).
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,

    /// Pause between two chapter inserts (milliseconds).
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay_ms: u64,

    /// Downloaded/available ratio a series needs before new chapters are
    /// queued automatically.
    #[serde(default = "default_min_ratio")]
    pub min_ratio: f64,
}

fn default_true() -> bool {
    true
}

fn default_recheck_interval() -> u64 {
    3 * 60 * 60
}

fn default_initial_delay() -> u64 {
    60
}

fn default_item_delay() -> u64 {
    10_000
}

fn default_chapter_delay() -> u64 {
    2000
}

fn default_min_ratio() -> f64 {
    0.95
}

impl Default for RecheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_recheck_interval(),
            initial_delay_secs: default_initial_delay(),
            item_delay_ms: default_item_delay(),
            chapter_delay_ms: default_chapter_delay(),
            min_ratio: default_min_ratio(),
        }
    }
}
