//! Connectivity awareness for long-running jobs.
//!
//! Splits collaborator failures into transient (network-like) and permanent,
//! and drives the wait/retry/cooldown policy applied to transient ones.

mod backoff;
mod classify;
mod flags;

pub use backoff::{BackoffController, BackoffPolicy, Flow, PhaseReporter, Recovery};
pub(crate) use backoff::sleep_or_cancel;
pub use classify::{is_transient, is_transient_message, TRANSIENT_SIGNATURES};
pub use flags::{ConnectivityMonitor, PlaybackMonitor, RuntimeFlags, SignalsSnapshot};
