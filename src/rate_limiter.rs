use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Minimum spacing between two consecutive calls.
    pub min_interval: Duration,
    /// Maximum number of calls in flight; `None` means unbounded.
    pub concurrency: Option<usize>,
}

/// Shared limiter for outbound API calls. Cloning shares the same state.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    last_call: Mutex<Option<Instant>>,
    sem: Option<Arc<Semaphore>>,
}

/// Held for the duration of a call; releases the concurrency slot on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let sem = limits.concurrency.map(|c| Arc::new(Semaphore::new(c.max(1))));
        Self {
            inner: Arc::new(Inner {
                limits,
                last_call: Mutex::new(None),
                sem,
            }),
        }
    }

    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self::new(Limits {
            min_interval,
            concurrency: None,
        })
    }

    /// Waits for a concurrency slot, then until `min_interval` has passed since the
    /// previous call was let through.
    pub async fn acquire(&self) -> Permit {
        let permit = match &self.inner.sem {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };

        // Sleeping under the lock keeps callers in arrival order.
        let mut last = self.inner.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.inner.limits.min_interval {
                let wait = self.inner.limits.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());

        Permit { _permit: permit }
    }
}
