//! Global request rate gate
//!
//! Fixed-window admission control shared by every channel. The gate never
//! blocks: a rejected caller is expected to tell the user to come back later.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default window length for per-minute limits
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    started: Instant,
}

/// Fixed-window limiter on request volume.
pub struct RateGate {
    capacity: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

impl RateGate {
    /// Gate admitting `capacity` requests per minute.
    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, DEFAULT_WINDOW)
    }

    pub fn new(capacity: u32, window: Duration) -> Self {
        Self::starting_at(capacity, window, Instant::now())
    }

    pub fn starting_at(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            window,
            state: Mutex::new(RateWindow {
                count: 0,
                started: now,
            }),
        }
    }

    /// Try to admit one request now.
    pub fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now.saturating_duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count < self.capacity {
            state.count += 1;
            true
        } else {
            debug!(capacity = self.capacity, "Rate gate rejected request");
            false
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
