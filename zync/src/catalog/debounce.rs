//! Trailing-edge debounce for search-as-you-type callers.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs only the last of a burst of calls
///
/// Every [`Debouncer::call`] waits `delay`; if another call started in the
/// meantime it returns `None` without running its work.
#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    /// Create a debouncer with a fixed quiet period
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `work` if no newer call arrives within the quiet period
    pub async fn call<F, T>(&self, work: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            return None;
        }
        Some(work.await)
    }
}
