//! Time-to-live cache with lazy background eviction.
//!
//! Used by collaborators to memoize remote lookups (catalog metadata,
//! provider responses) without letting memory grow without bound.

mod ttl;

pub use ttl::{TtlCache, MIN_SWEEP_INTERVAL};
