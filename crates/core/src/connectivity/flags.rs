use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-wide "are we offline" signal.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_offline(&self) -> bool;
}

/// Process-wide "is the user watching/reading something" signal.
pub trait PlaybackMonitor: Send + Sync {
    fn is_playback_active(&self) -> bool;
}

/// Current value of every runtime flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalsSnapshot {
    pub offline: bool,
    pub playback_active: bool,
}

/// Shared atomic flags set by the rest of the application.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RuntimeFlags {
    offline: Arc<AtomicBool>,
    playback: Arc<AtomicBool>,
}

impl RuntimeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_playback_active(&self, active: bool) {
        self.playback.store(active, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            offline: self.is_offline(),
            playback_active: self.is_playback_active(),
        }
    }
}

impl ConnectivityMonitor for RuntimeFlags {
    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }
}

impl PlaybackMonitor for RuntimeFlags {
    fn is_playback_active(&self) -> bool {
        self.playback.load(Ordering::SeqCst)
    }
}
