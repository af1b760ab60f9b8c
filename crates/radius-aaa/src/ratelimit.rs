//! Per-username authentication throttling
//!
//! [`AuthRateCache`] holds one in-flight attempt per username for a minimum
//! interval. [`RejectCache`] counts recent rejects per username and locks the
//! account out once a threshold is crossed inside a rolling window.
//!
//! Both are constructed once per server and shared through `Arc`; each owns
//! its lock and never holds it across an await point.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Idle time after which a username's reject counter starts over
pub const REJECT_WINDOW: Duration = Duration::from_secs(10);

/// Throttling configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum time between two attempts for the same username
    pub auth_interval: Duration,
    /// Rejects tolerated inside the window before lockout
    pub reject_max: u32,
    /// Entry count above which the reject cache is cleared wholesale
    pub reject_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            auth_interval: Duration::from_secs(1),
            reject_max: 7,
            reject_capacity: 65536,
        }
    }
}

/// Username to last-attempt instant
#[derive(Debug)]
pub struct AuthRateCache {
    attempts: DashMap<String, Instant>,
    interval: Duration,
}

impl AuthRateCache {
    pub fn new(interval: Duration) -> Self {
        AuthRateCache {
            attempts: DashMap::new(),
            interval,
        }
    }

    /// Records an attempt. Returns false when another attempt for the same
    /// username is younger than the interval.
    pub fn check(&self, username: &str) -> bool {
        let now = Instant::now();
        match self.attempts.entry(username.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.interval {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Drops the hold so the next attempt is evaluated immediately
    pub fn release(&self, username: &str) {
        self.attempts.remove(username);
    }

    /// Removes holds older than the interval; returns how many went
    pub fn cleanup(&self) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, at| at.elapsed() < self.interval);
        before - self.attempts.len()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// Periodically drop holds that were never released, e.g. for requests
/// whose reply was lost in a panicking worker
pub fn spawn_cleanup(cache: Arc<AuthRateCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = cache.cleanup();
            if removed > 0 {
                tracing::debug!(removed, "Dropped stale authentication holds");
            }
        }
    })
}

#[derive(Debug, Clone, Copy)]
struct RejectItem {
    rejects: u32,
    last_reject: Instant,
}

/// Username to rolling reject counter
#[derive(Debug)]
pub struct RejectCache {
    items: DashMap<String, RejectItem>,
    window: Duration,
    capacity: usize,
}

impl RejectCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_window(capacity, REJECT_WINDOW)
    }

    pub fn with_window(capacity: usize, window: Duration) -> Self {
        RejectCache {
            items: DashMap::new(),
            window,
            capacity,
        }
    }

    /// Counts one more reject for `username`
    pub fn incr(&self, username: &str) {
        if self.items.len() >= self.capacity && !self.items.contains_key(username) {
            self.items.clear();
        }

        let now = Instant::now();
        self.items
            .entry(username.to_string())
            .and_modify(|item| {
                item.rejects = item.rejects.saturating_add(1);
                item.last_reject = now;
            })
            .or_insert(RejectItem {
                rejects: 1,
                last_reject: now,
            });
    }

    /// True once more than `max` rejects happened without a quiet window
    /// in between. An idle entry is reset to zero.
    pub fn is_over(&self, username: &str, max: u32) -> bool {
        let Some(mut item) = self.items.get_mut(username) else {
            return false;
        };
        if item.last_reject.elapsed() > self.window {
            item.rejects = 0;
            return false;
        }
        item.rejects > max
    }

    /// Current counter, for diagnostics
    pub fn rejects(&self, username: &str) -> u32 {
        self.items.get(username).map(|item| item.rejects).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
