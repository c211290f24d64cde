//! Sliding-window limiter for outbound fetches.
//!
//! Process-local by design: the window lives in memory and resets on restart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::LimiterConfig;

pub struct RateLimiter {
    window: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            capacity,
            clock,
            granted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn from_config(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.window.as_duration(), config.max_requests, clock)
    }

    /// Takes a slot if fewer than `capacity` grants fall inside the trailing window.
    ///
    /// Denied calls are not recorded, so the queue never holds more than
    /// `capacity` instants.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut granted = self.lock();
        self.prune(&mut granted, now);

        if granted.len() < self.capacity {
            granted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Time until the oldest grant leaves the window, zero when a slot is free
    pub fn time_until_next_slot(&self) -> Duration {
        let now = self.clock.now();
        let mut granted = self.lock();
        self.prune(&mut granted, now);

        if granted.len() < self.capacity {
            return Duration::ZERO;
        }
        match granted.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        let mut granted = self.lock();
        self.prune(&mut granted, now);
        granted.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn prune(&self, granted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = granted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                granted.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
