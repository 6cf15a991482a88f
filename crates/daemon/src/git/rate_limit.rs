// Sliding one-hour window over commit timestamps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CommitRateLimiter {
    max_per_window: Option<u32>,
    commits: VecDeque<Instant>,
}

impl CommitRateLimiter {
    /// `None` disables limiting.
    pub fn new(max_per_hour: Option<u32>) -> Self {
        Self { max_per_window: max_per_hour, commits: VecDeque::new() }
    }

    pub fn allows(&mut self) -> bool {
        self.allows_at(Instant::now())
    }

    pub fn allows_at(&mut self, now: Instant) -> bool {
        let Some(max) = self.max_per_window else {
            return true;
        };
        self.expire(now);
        self.commits.len() < max as usize
    }

    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&mut self, now: Instant) {
        self.commits.push_back(now);
        self.expire(now);
    }

    /// Time until the next commit is allowed, or `None` if one is allowed now.
    pub fn retry_after(&mut self) -> Option<Duration> {
        self.retry_after_at(Instant::now())
    }

    pub fn retry_after_at(&mut self, now: Instant) -> Option<Duration> {
        if self.allows_at(now) {
            return None;
        }
        let oldest = self.commits.front()?;
        Some(WINDOW.saturating_sub(now.saturating_duration_since(*oldest)))
    }

    /// Commits counted in the current window.
    pub fn recent(&self) -> usize {
        self.commits.len()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.commits.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                self.commits.pop_front();
            } else {
                break;
            }
        }
    }
}
