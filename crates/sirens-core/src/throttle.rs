//! Per-origin request throttling for polite crawling.
//!
//! [`SpeedLimit`] is the [`RateLimiter`] the application installs when the
//! config carries `interval`. It enforces a minimum delay between requests
//! to the same origin, optionally with random jitter on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sirens_core::throttle::SpeedLimit;
//! use sirens_core::traits::RateLimiter;
//!
//! # async fn run() {
//! let limit = SpeedLimit::new(Duration::from_secs(1)).with_jitter(Duration::from_millis(500));
//! limit.throttle("https://example.com/a").await;
//! limit.throttle("https://example.com/b").await; // waits ~1s
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::traits::RateLimiter;

/// Minimum-interval limiter keyed by origin (scheme + host + port).
///
/// Clones share state, so one limiter can be handed to many workers.
#[derive(Clone)]
pub struct SpeedLimit {
    /// Minimum delay between consecutive requests to the same origin.
    delay: Duration,
    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    jitter: Duration,
    /// Last request time per origin.
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl SpeedLimit {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
            last_request: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add random jitter (uniform [0, jitter]) on top of the base delay.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Compute the effective delay for a single wait (delay + random jitter).
    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }

    /// Extract the origin key from a URL (scheme://host:port).
    fn origin_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Reserve the next free slot for `origin` and sleep until it.
    ///
    /// The slot is claimed under the lock, so concurrent callers queue up
    /// one interval apart instead of all waking at the same instant.
    async fn wait_for_origin(&self, origin: &str) {
        let now = Instant::now();
        let slot = {
            let mut map = self.last_request.lock().await;
            let slot = match map.get(origin) {
                Some(&last) => (last + self.effective_delay()).max(now),
                None => now,
            };
            map.insert(origin.to_string(), slot);
            slot
        };

        if slot > now {
            tracing::debug!(
                origin = %origin,
                sleep_ms = %(slot - now).as_millis(),
                "Throttling request"
            );
            tokio::time::sleep_until(tokio::time::Instant::from_std(slot)).await;
        }
    }
}

impl RateLimiter for SpeedLimit {
    async fn throttle(&self, url: &str) {
        if let Some(origin) = Self::origin_key(url) {
            self.wait_for_origin(&origin).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Jitter based on std: a simple xorshift seeded from the current time.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
