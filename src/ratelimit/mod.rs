//! Throttling driven by the usage counters the server reports.
//!
//! Every response carries `x-ratelimit-used`, `x-ratelimit-remaining` and
//! `x-ratelimit-reset` (seconds until the window rolls over). The limiter
//! keeps the latest trustworthy reading and holds callers back once the
//! budget for the current window is spent.
//!
//! One limiter is shared by every clone of a client, so its state sits
//! behind a `tokio::sync::Mutex`. The lock is never held while waiting for
//! a window to reset.

use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const USED_HEADER: &str = "x-ratelimit-used";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Latest accepted reading of the server's counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitState {
    pub used: f64,
    pub remaining: f64,
    pub reset_at: Instant,
}

/// One parsed set of usage headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub used: f64,
    pub remaining: f64,
    pub reset: Duration,
}

impl Usage {
    /// Parse the usage headers. Returns `None` unless all three are present
    /// and numeric; partial or malformed telemetry is treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let used = header_f64(headers, USED_HEADER)?;
        let remaining = header_f64(headers, REMAINING_HEADER)?;
        let reset = header_f64(headers, RESET_HEADER)?;
        Some(Self {
            used,
            remaining,
            // Negative or out-of-range values fail the conversion.
            reset: Duration::try_from_secs_f64(reset).ok()?,
        })
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    let value = headers.get(name)?.to_str().ok()?.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Option<RateLimitState>>,
    enabled: bool,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            enabled: true,
        }
    }

    /// A limiter that records usage but never makes callers wait.
    pub fn disabled() -> Self {
        Self {
            state: Mutex::new(None),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wait until the current window has budget left.
    ///
    /// The deadline is read under the lock, the lock is released for the
    /// sleep, and the state is checked again afterwards since another
    /// response may have moved the window in the meantime.
    pub async fn throttle(&self) {
        if !self.enabled {
            return;
        }

        loop {
            let deadline = {
                let state = self.state.lock().await;
                match *state {
                    Some(s) if s.remaining <= 0.0 && Instant::now() < s.reset_at => Some(s.reset_at),
                    _ => None,
                }
            };

            match deadline {
                Some(reset_at) => {
                    info!(
                        "Rate limit budget exhausted, waiting {:.1}s for the window to reset",
                        reset_at.saturating_duration_since(Instant::now()).as_secs_f64()
                    );
                    tokio::time::sleep_until(reset_at).await;
                }
                None => return,
            }
        }
    }

    /// Feed response headers into the limiter. Returns whether the state
    /// changed; absent or malformed headers leave it untouched.
    pub async fn record_response(&self, headers: &HeaderMap) -> bool {
        match Usage::from_headers(headers) {
            Some(usage) => self.record(usage).await,
            None => {
                debug!("No usable rate limit headers on response");
                false
            }
        }
    }

    /// Commit a usage reading unless it looks older than the one we have.
    ///
    /// Inside the current window `used` only grows and `remaining` only
    /// shrinks, so a reading that goes the other way came from a response
    /// that was overtaken by a newer one. Such readings are dropped. A
    /// server-side reset that lands just before our `reset_at` is dropped
    /// the same way until our own deadline passes.
    pub async fn record(&self, usage: Usage) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if let Some(current) = *state {
            if now < current.reset_at
                && (usage.used < current.used || usage.remaining > current.remaining)
            {
                warn!(
                    "Ignoring stale rate limit update (used {} -> {}, remaining {} -> {})",
                    current.used, usage.used, current.remaining, usage.remaining
                );
                return false;
            }
        }

        let reset_at = match now.checked_add(usage.reset) {
            Some(reset_at) => reset_at,
            None => {
                warn!("Ignoring rate limit update with unusable reset {:?}", usage.reset);
                return false;
            }
        };

        *state = Some(RateLimitState {
            used: usage.used,
            remaining: usage.remaining,
            reset_at,
        });
        debug!(
            "Rate limit: used {}, remaining {}, reset in {:.0}s",
            usage.used,
            usage.remaining,
            usage.reset.as_secs_f64()
        );
        true
    }

    /// Time left in the current window, zero when none is known.
    pub async fn time_until_reset(&self) -> Duration {
        match *self.state.lock().await {
            Some(s) => s.reset_at.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    pub async fn snapshot(&self) -> Option<RateLimitState> {
        *self.state.lock().await
    }
}
