//! Rate-limited HTTP fetching for services that poll an external resource.
//!
//! [`PollingFetcher`] keeps a minimum interval between successive completed
//! fetches: each [`fetch`](PollingFetcher::fetch) first waits until
//! `last_completion + interval`, and only a fetch whose body was read in full
//! counts as completed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::{log_debug, log_error, Result};

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Minimum spacing between completed operations.
///
/// The first [`wait`](Self::wait) returns immediately; after
/// [`mark_completed`](Self::mark_completed) the next one sleeps until the
/// interval has passed.
#[derive(Debug, Default)]
pub struct RateLimiter {
    interval: Mutex<Duration>,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: Mutex::new(interval),
            next_allowed: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        *lock_ignore_poison(&self.interval)
    }

    /// Applies from the next completion on.
    pub fn set_interval(&self, interval: Duration) {
        *lock_ignore_poison(&self.interval) = interval;
    }

    /// Sleep until the next operation is allowed.
    pub async fn wait(&self) {
        // ---
        let deadline = *lock_ignore_poison(&self.next_allowed);
        if let Some(deadline) = deadline {
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Record a completed operation now.
    pub fn mark_completed(&self) {
        // ---
        let next = Instant::now() + self.interval();
        *lock_ignore_poison(&self.next_allowed) = Some(next);
    }
}

/// HTTP GET client with fixed request headers and a [`RateLimiter`].
///
/// # Example
///
/// ```no_run
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// use mq_service::PollingFetcher;
///
/// # async fn example() -> mq_service::Result<()> {
/// let headers = HashMap::from([("Accept".to_string(), "application/json".to_string())]);
/// let fetcher = PollingFetcher::new(headers);
/// fetcher.set_interval(Duration::from_secs(1));
///
/// let releases: Vec<serde_json::Value> =
///     fetcher.fetch_and_decode("https://example.org/releases").await?;
/// # let _ = releases;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PollingFetcher {
    // ---
    http: reqwest::Client,
    headers: HashMap<String, String>,
    limiter: RateLimiter,
}

impl PollingFetcher {
    /// Fetcher sending `headers` with every request; no interval until
    /// [`set_interval`](Self::set_interval) is called.
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            headers,
            limiter: RateLimiter::default(),
        }
    }

    pub fn set_interval(&self, interval: Duration) {
        self.limiter.set_interval(interval);
    }

    pub fn interval(&self) -> Duration {
        self.limiter.interval()
    }

    /// GET `url` once the interval since the last completed fetch has passed.
    ///
    /// # Errors
    ///
    /// [`RpcError::Fetch`](crate::RpcError::Fetch) when the request cannot be
    /// sent or its body cannot be read. A failed fetch does not restart the
    /// interval.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        // ---
        self.limiter.wait().await;

        let response = self.get(url).send().await?;
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                log_error!("status=fail {url}");
                return Err(e.into());
            }
        };

        self.limiter.mark_completed();
        log_debug!(status = "ok", "{url}");

        Ok(body)
    }

    /// [`fetch`](Self::fetch) `url` and decode the body as JSON.
    pub async fn fetch_and_decode<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        // ---
        let body = self.fetch(url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send the same request as [`fetch`](Self::fetch) but ignore the rate
    /// limit, returning the raw response (status and headers).
    ///
    /// Not meant for regular polling.
    pub async fn probe(&self, url: &str) -> Result<reqwest::Response> {
        Ok(self.get(url).send().await?)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        // ---
        self.headers
            .iter()
            .fold(self.http.get(url), |req, (k, v)| req.header(k.as_str(), v.as_str()))
    }
}
