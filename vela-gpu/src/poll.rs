// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Busy-poll wait on the completion tag.
//!
//! Waiting never sleeps in the kernel: the caller spins on the tag word,
//! sampling the clock between bursts of `spin_count` pause instructions.
//! A [`WaitToken`] lets another thread (or a test) cancel the loop or cap
//! the number of iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vela_common::{Settings, TaskCount};

use crate::tag::TagAddress;

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause instructions between two tag reads.
    pub spin_count: u32,
}

impl PollConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            spin_count: settings.poll_spin_count,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Cancellation handle for a polling wait.
#[derive(Debug, Clone, Default)]
pub struct WaitToken {
    cancelled: Arc<AtomicBool>,
    iteration_limit: Option<u64>,
}

impl WaitToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that gives up after `limit` poll iterations per wait.
    pub fn with_iteration_limit(limit: u64) -> Self {
        Self {
            iteration_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether a wait that has polled `iterations` times should give up.
    pub fn should_stop(&self, iterations: u64) -> bool {
        self.is_cancelled() || self.iteration_limit.is_some_and(|limit| iterations >= limit)
    }
}

/// Spin until `tag` reaches `target`, `timeout` elapses, or `token` stops the wait.
/// Returns whether the tag reached `target`.
pub fn wait_for_task_count(
    tag: &TagAddress,
    target: TaskCount,
    timeout: Option<Duration>,
    config: &PollConfig,
    token: Option<&WaitToken>,
) -> bool {
    let start = Instant::now();
    let mut iterations = 0u64;

    while !tag.has_reached(target) {
        if token.is_some_and(|t| t.should_stop(iterations)) {
            break;
        }
        for _ in 0..config.spin_count {
            std::hint::spin_loop();
        }
        iterations += 1;
        if timeout.is_some_and(|t| start.elapsed() > t) {
            break;
        }
    }

    let reached = tag.has_reached(target);
    log::trace!(
        "poll: target={} tag={} reached={} iterations={} elapsed={:?}",
        target,
        tag.read(),
        reached,
        iterations,
        start.elapsed()
    );
    reached
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_reached_returns_immediately() {
        let tag = TagAddress::detached();
        tag.writer().complete(4);
        assert!(wait_for_task_count(&tag, 4, None, &PollConfig::default(), None));
    }

    #[test]
    fn test_timeout_returns_false() {
        let tag = TagAddress::detached();
        let start = Instant::now();
        let reached = wait_for_task_count(
            &tag,
            1,
            Some(Duration::from_millis(5)),
            &PollConfig::default(),
            None,
        );
        assert!(!reached);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_iteration_limit_bounds_the_loop() {
        let tag = TagAddress::detached();
        let token = WaitToken::with_iteration_limit(10);
        assert!(!wait_for_task_count(&tag, 1, None, &PollConfig { spin_count: 1 }, Some(&token)));
    }

    #[test]
    fn test_cancelled_token_stops_wait() {
        let tag = TagAddress::detached();
        let token = WaitToken::new();
        token.cancel();
        assert!(!wait_for_task_count(&tag, 1, None, &PollConfig::default(), Some(&token)));
    }

    #[test]
    fn test_completion_from_another_thread() {
        let tag = TagAddress::detached();
        let writer = tag.writer();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(2));
            writer.complete(2);
        });
        assert!(wait_for_task_count(
            &tag,
            2,
            Some(Duration::from_secs(10)),
            &PollConfig::default(),
            None
        ));
        handle.join().unwrap();
    }
}
