//! Per-user sliding-window rate limiter (spec §4.B: 60s x 15 requests).
//!
//! Kept as plain `std::sync::Mutex<HashMap<...>>` state rather than a
//! crate, matching the teacher's posture of hand-rolling small pieces of
//! shared mutable state (see `MockRenderService`'s `Arc<Mutex<Vec<...>>>`
//! history) instead of reaching for a dependency. Per spec §5 this state is
//! per-process and soft: a multi-instance deployment accepts slight
//! over-permission across workers, noted as an explicit open-question
//! resolution in DESIGN.md.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<HashMap<Uuid, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the request is admitted (and records it);
    /// `false` if the user has exceeded the window and the adapter should
    /// refuse fast with `rate_limited`, per spec §4.B.
    pub fn try_admit(&self, user_id: Uuid) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(user_id).or_default();

        while let Some(oldest) = entry.front() {
            if now.duration_since(*oldest) > self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() as u32 >= self.max_requests {
            return false;
        }

        entry.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 15);
        let user = Uuid::new_v4();
        for _ in 0..15 {
            assert!(limiter.try_admit(user));
        }
        assert!(!limiter.try_admit(user));
    }

    #[test]
    fn test_independent_per_user() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(limiter.try_admit(a));
        assert!(!limiter.try_admit(a));
        assert!(limiter.try_admit(b));
    }

    #[test]
    fn test_stale_entries_expire() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);
        let user = Uuid::new_v4();
        assert!(limiter.try_admit(user));
        assert!(!limiter.try_admit(user));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_admit(user));
    }
}
