use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

// Rate limit entry - tracks requests per IP/key
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Fixed-window request limiter keyed by client identity.
///
/// Windows live in a sharded map; `admit` holds the key's shard lock for the
/// whole read-modify-write, so concurrent requests from one client can never
/// push the count past `limit`.
pub struct RateLimiter {
    windows: DashMap<String, RateLimitEntry>,
    limit: u32,       // max requests allowed per window
    window: Duration, // length of a window
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self, key: &str) -> Admission {
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window elapsed..? restart it
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.limit {
            entry.count += 1;
            return Admission::Allowed;
        }

        let retry_after = self
            .window
            .saturating_sub(now.duration_since(entry.window_start));
        Admission::Rejected { retry_after }
    }

    // Drop windows that have fully elapsed; returns how many were removed
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
