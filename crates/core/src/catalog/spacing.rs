use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

/// Serializes requests and keeps a minimum interval between their starts.
///
/// Holding the returned guard keeps other callers waiting, so at most one
/// request is in flight at a time.
#[derive(Debug)]
pub struct RequestSpacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

pub struct SpacerGuard<'a> {
    _last: MutexGuard<'a, Option<Instant>>,
}

impl RequestSpacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    pub async fn acquire(&self) -> SpacerGuard<'_> {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
        SpacerGuard { _last: last }
    }
}
