//! Retry policy and scheduling.
//!
//! Both are driven by caller-supplied `Instant`s rather than an internal
//! clock, so tests exercise the 429/backoff behavior on simulated time.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::schema::RetrySettings;
use crate::pipeline::error::AttemptError;
use crate::provider::ProviderError;
use crate::worker::job::Job;

/// Retryable failure classes, each with its own retry cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RateLimit,
    Network,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_rate_limit_retries: u32,
    max_network_retries: u32,
    initial: Duration,
    max: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_rate_limit_retries: settings.max_rate_limit_retries,
            max_network_retries: settings.max_network_retries,
            initial: Duration::from_millis(settings.initial_backoff_ms),
            max: Duration::from_millis(settings.max_backoff_ms),
            jitter: settings.jitter,
        }
    }

    /// Sorts an attempt failure into a retry class, or `None` when it is
    /// terminal for the job.
    pub fn classify(&self, error: &AttemptError) -> Option<RetryClass> {
        match error {
            AttemptError::Provider(ProviderError::RateLimited { .. }) => Some(RetryClass::RateLimit),
            AttemptError::Provider(ProviderError::Network(_)) => Some(RetryClass::Network),
            _ => None,
        }
    }

    pub fn max_retries(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::RateLimit => self.max_rate_limit_retries,
            RetryClass::Network => self.max_network_retries,
        }
    }

    /// Hint from the provider for how long to wait, if any.
    pub fn retry_after_hint(error: &AttemptError) -> Option<Duration> {
        match error {
            AttemptError::Provider(ProviderError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }

    /// Delay before redispatching. A server-supplied hint wins; otherwise
    /// exponential backoff from the initial delay, optionally jittered,
    /// capped at the configured maximum.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max);
        }

        let exponent = attempt.min(20);
        let base = self
            .initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max);

        if self.jitter {
            let factor = 1.0 + rand::thread_rng().gen_range(0.0..0.5);
            base.mul_f64(factor).min(self.max)
        } else {
            base
        }
    }
}

struct ScheduledRetry {
    ready_at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ready_at, self.seq).cmp(&(other.ready_at, other.seq))
    }
}

/// Jobs waiting out a backoff delay, ordered by readiness.
#[derive(Default)]
pub struct RetryQueue {
    heap: BinaryHeap<Reverse<ScheduledRetry>>,
    seq: u64,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job, ready_at: Instant) {
        self.seq += 1;
        self.heap.push(Reverse(ScheduledRetry {
            ready_at,
            seq: self.seq,
            job,
        }));
    }

    /// Removes and returns the next job whose delay has elapsed at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Job> {
        if self.heap.peek()?.0.ready_at <= now {
            Some(self.heap.pop().expect("peeked entry exists").0.job)
        } else {
            None
        }
    }

    /// When the earliest queued retry becomes ready, if any.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.0.ready_at)
    }

    /// Empties the queue, returning the jobs. Used on cancellation.
    pub fn drain(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|entry| entry.0.job)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
