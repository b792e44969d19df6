//! Per-user sliding-window admission control.
//!
//! State is in-memory only and resets on restart.

use crate::identity::normalize_user_id;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the oldest request leaves the window (0 when allowed).
    pub wait_secs: u64,
}

/// Window usage for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStats {
    pub requests_in_window: usize,
    pub max_requests: usize,
    pub window_secs: u64,
}

/// Checks between sweeps of idle users.
const SWEEP_EVERY: u64 = 256;

pub struct RateLimiter {
    requests: DashMap<String, Vec<Instant>>,
    max_requests: usize,
    window: Duration,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            max_requests,
            window,
            checks: AtomicU64::new(0),
        }
    }

    /// Check and record a request from `user_id`.
    pub fn is_allowed(&self, user_id: &str) -> RateDecision {
        self.is_allowed_at(user_id, Instant::now())
    }

    /// Same as [`is_allowed`](Self::is_allowed) with an explicit clock.
    pub fn is_allowed_at(&self, user_id: &str, now: Instant) -> RateDecision {
        // Before taking the entry: sweeping locks every shard.
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep_at(now);
        }

        let key = normalize_user_id(user_id);
        let mut entry = self.requests.entry(key).or_default();

        entry.retain(|&t| now.saturating_duration_since(t) < self.window);

        if entry.len() >= self.max_requests {
            let wait = entry
                .first()
                .map(|&oldest| {
                    self.window
                        .saturating_sub(now.saturating_duration_since(oldest))
                })
                .unwrap_or(self.window);
            let wait_secs = ceil_secs(wait).max(1);
            debug!("rate limited {}: retry in {wait_secs}s", entry.key());
            return RateDecision {
                allowed: false,
                wait_secs,
            };
        }

        entry.push(now);
        RateDecision {
            allowed: true,
            wait_secs: 0,
        }
    }

    /// Drop users with no request left in the window. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.requests.len();
        self.requests.retain(|_, times| {
            times.retain(|&t| now.saturating_duration_since(t) < self.window);
            !times.is_empty()
        });
        let removed = before.saturating_sub(self.requests.len());
        if removed > 0 {
            debug!("rate limiter: dropped {removed} idle user(s)");
        }
        removed
    }

    /// Number of users with recorded requests.
    pub fn tracked_users(&self) -> usize {
        self.requests.len()
    }

    /// Forget all recorded requests for a user.
    pub fn reset_user(&self, user_id: &str) {
        let key = normalize_user_id(user_id);
        if self.requests.remove(&key).is_some() {
            info!("reset rate limit for {key}");
        }
    }

    /// Current window usage for a user (does not record a request).
    pub fn user_stats(&self, user_id: &str) -> RateStats {
        let key = normalize_user_id(user_id);
        let now = Instant::now();
        let requests_in_window = self
            .requests
            .get(&key)
            .map(|e| {
                e.iter()
                    .filter(|&&t| now.saturating_duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        RateStats {
            requests_in_window,
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
