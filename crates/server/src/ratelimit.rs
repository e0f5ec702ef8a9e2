//! Per-IP rate limiting.
//!
//! A fixed-window in-memory counter map. State is process-local and resets
//! on worker restart, which is the expected behavior on an edge platform
//! where workers are short-lived anyway.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use wharf_core::config::RateLimitConfig;

struct Entry {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub retry_after_secs: u64,
}

/// Fixed-window per-client rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, entries: Mutex::new(HashMap::new()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision {
                allowed: true,
                remaining: self.config.max_requests,
                limit: self.config.max_requests,
                retry_after_secs: 0,
            };
        }

        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        let mut entries = self.entries.lock().expect("rate limiter lock");

        // Drop expired windows opportunistically so the map stays bounded.
        if entries.len() >= self.config.max_entries {
            entries.retain(|_, e| e.reset_at > now);
        }

        let entry = entries.entry(client.to_string()).or_insert(Entry {
            count: 0,
            reset_at: now + window,
        });
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;

        let allowed = entry.count <= self.config.max_requests;
        RateLimitDecision {
            allowed,
            remaining: self.config.max_requests.saturating_sub(entry.count),
            limit: self.config.max_requests,
            retry_after_secs: if allowed { 0 } else { self.config.window_secs },
        }
    }
}
