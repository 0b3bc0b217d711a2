//! Rolling-window rate limiting for outbound provider calls.
//!
//! A [`RateLimiter`] allows at most `max_per_second` call starts inside any
//! one-second window. It keeps the start instants of recent calls; before a
//! new call starts, instants older than the window are discarded and, if the
//! window is full, the caller sleeps until the oldest start leaves it.
//!
//! One limiter must exist per provider. Components receive it from the
//! [`LimiterRegistry`] built at startup instead of creating their own, since
//! two limiters in front of the same provider double the effective rate.
//!
//! ```rust,ignore
//! let limiter = RateLimiter::new("tavily", 5)?;
//! let hits = limiter
//!     .run(queries, |q| async move { searcher.search(&q, 5).await })
//!     .await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{PipelineError, Result};

const WINDOW: Duration = Duration::from_millis(1000);

/// Sliding-window limiter shared by every caller of one provider.
pub struct RateLimiter {
    name: String,
    max_per_second: usize,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. Fails with a configuration error when the rate is zero.
    pub fn new(name: impl Into<String>, max_per_second: usize) -> Result<Self> {
        let name = name.into();
        if max_per_second == 0 {
            return Err(PipelineError::Configuration(format!(
                "rate limit for '{}' must be greater than zero",
                name
            )));
        }

        Ok(Self {
            name,
            max_per_second,
            starts: Mutex::new(VecDeque::with_capacity(max_per_second)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_per_second(&self) -> usize {
        self.max_per_second
    }

    /// Wait until one more call may start, then record its start.
    ///
    /// The lock is held while sleeping so that concurrent callers queue up
    /// in order instead of racing for the same free slot.
    pub async fn acquire(&self) {
        let mut starts = self.starts.lock().await;

        prune(&mut starts, Instant::now());
        if starts.len() >= self.max_per_second {
            if let Some(oldest) = starts.front().copied() {
                let resume_at = oldest + WINDOW;
                debug!(
                    limiter = %self.name,
                    wait_ms = resume_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "rate window full, waiting"
                );
                tokio::time::sleep_until(resume_at).await;
            }
            prune(&mut starts, Instant::now());
        }

        starts.push_back(Instant::now());
    }

    /// Run `op` over `items` one at a time, throttled by this limiter.
    ///
    /// Results keep the input order. The first error stops the batch: no
    /// further items are started and nothing is retried here.
    pub async fn run<T, R, F, Fut>(&self, items: impl IntoIterator<Item = T>, mut op: F) -> Result<Vec<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let items = items.into_iter();
        let mut results = Vec::with_capacity(items.size_hint().0);

        for item in items {
            self.acquire().await;
            results.push(op(item).await?);
        }

        Ok(results)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("max_per_second", &self.max_per_second)
            .finish()
    }
}

fn prune(starts: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = starts.front() {
        if now.duration_since(*oldest) >= WINDOW {
            starts.pop_front();
        } else {
            break;
        }
    }
}

/// One-shot throttled batch with a limiter of its own.
///
/// Only for callers that own the provider exclusively; shared providers go
/// through [`LimiterRegistry`].
pub async fn throttled<T, R, F, Fut>(
    max_per_second: usize,
    items: impl IntoIterator<Item = T>,
    op: F,
) -> Result<Vec<R>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    RateLimiter::new("batch", max_per_second)?.run(items, op).await
}

/// External services the pipeline calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Search,
    Generation,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Search => f.write_str("search"),
            Provider::Generation => f.write_str("generation"),
        }
    }
}

/// Process-wide set of limiters, one per provider.
#[derive(Debug, Clone, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<Provider, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the limiter for a provider, replacing any previous one.
    pub fn with_limit(mut self, provider: Provider, max_per_second: usize) -> Result<Self> {
        let limiter = RateLimiter::new(provider.to_string(), max_per_second)?;
        self.limiters.insert(provider, Arc::new(limiter));
        Ok(self)
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<RateLimiter>> {
        self.limiters.get(&provider).cloned().ok_or_else(|| {
            PipelineError::Configuration(format!("no rate limiter registered for {}", provider))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn zero_rate_is_rejected() {
        let err = RateLimiter::new("search", 0).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn under_the_limit_does_not_wait() {
        let limiter = RateLimiter::new("search", 5).unwrap();
        let started = Instant::now();

        let out = limiter
            .run(0..5, |i| async move { Ok::<_, PipelineError>(i * 2) })
            .await
            .unwrap();

        assert_eq!(out, vec![0, 2, 4, 6, 8]);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn failure_stops_the_batch() {
        let limiter = RateLimiter::new("search", 100).unwrap();
        let started = Arc::new(AtomicUsize::new(0));

        let counter = started.clone();
        let result = limiter
            .run(0..10, move |i| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if i == 3 {
                        Err(PipelineError::transient("search", "boom"))
                    } else {
                        Ok(i)
                    }
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn registry_hands_out_the_same_instance() {
        let registry = LimiterRegistry::new().with_limit(Provider::Search, 3).unwrap();

        let a = registry.get(Provider::Search).unwrap();
        let b = registry.get(Provider::Search).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get(Provider::Generation).is_err());
    }
}
