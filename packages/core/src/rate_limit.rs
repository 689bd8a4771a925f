//! Fixed-window request limiting keyed by client IP.
//!
//! Each key gets `max_requests` per `window`; the window starts with the
//! first request and resets once it has elapsed. State is process-local.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

/// Entries are swept for expiry once the map reaches this size.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 3 requests per 15 minutes.
    pub fn newsletter() -> Self {
        Self::new(3, Duration::from_secs(15 * 60))
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request for `key`. Returns the seconds until the window
    /// resets when the limit is already used up.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let mut windows = self.windows();
        if windows.len() >= SWEEP_THRESHOLD {
            let ttl = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < ttl);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }
        entry.count += 1;
        Ok(())
    }
}

/// Best guess at the caller's address: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket peer, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
