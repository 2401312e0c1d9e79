//! Sliding-window limiter for LLM escalations.
//!
//! Memory is bounded by `max_calls`: timestamps older than the window are
//! evicted before each check, and at most `max_calls` are retained.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct EscalationWindow {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl EscalationWindow {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls.min(1024))),
        }
    }

    /// Record an escalation attempt if the window has room. Returns false
    /// when the budget is exhausted; the caller must then skip tier 3.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut calls = self.calls.lock().unwrap();
        while let Some(front) = calls.front() {
            if now.duration_since(*front) > self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() >= self.max_calls {
            return false;
        }
        calls.push_back(now);
        true
    }
}
