//! Bounded retry and provider call spacing.
//!
//! `RetryPolicy` is shared by the metadata matcher and the lyric fetcher.
//! The retry budget belongs to one entry: every query strategy issued for
//! that entry draws transient retries from the same budget.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ProviderError;

// ============================================================================
// Backoff
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * 2^(n-1)` for the n-th retry, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the `retry`-th retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let exp = retry.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << exp).min(max)
            }
        }
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Transient retries still available to one entry.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    remaining: u32,
    used: u32,
}

impl RetryBudget {
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

/// Outcome of one query strategy after retries.
#[derive(Debug)]
pub struct Attempt<T> {
    pub outcome: Result<T, ProviderError>,
    /// Provider calls issued, including the first.
    pub calls: u32,
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self { max_retries, backoff }
    }

    /// Policy with fixed delay between attempts.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries, Backoff::Fixed(delay))
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Fresh budget for one entry.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            remaining: self.max_retries,
            used: 0,
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or the budget is spent.
    /// The same request is repeated on every retry.
    pub fn run<T, F>(&self, budget: &mut RetryBudget, label: &str, mut op: F) -> Attempt<T>
    where
        F: FnMut() -> Result<T, ProviderError>,
    {
        let mut calls = 0;
        loop {
            calls += 1;
            match op() {
                Ok(value) => {
                    return Attempt {
                        outcome: Ok(value),
                        calls,
                    }
                }
                Err(e) if e.is_transient() && budget.remaining > 0 => {
                    budget.remaining -= 1;
                    budget.used += 1;
                    let delay = self.backoff.delay_for(budget.used);
                    warn!(
                        query = label,
                        error = %e,
                        retry = budget.used,
                        delay_ms = delay.as_millis() as u64,
                        "transient provider error, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                Err(e) => {
                    return Attempt {
                        outcome: Err(e),
                        calls,
                    }
                }
            }
        }
    }
}

// ============================================================================
// Throttle
// ============================================================================

/// Enforces a minimum interval between calls to one provider.
///
/// Shared through `Arc` by every worker calling that provider, so the gap
/// holds globally and not per thread.
#[derive(Debug)]
pub struct Throttle {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    /// Block until the next call is allowed, then claim the slot.
    pub fn wait(&self) {
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                thread::sleep(wait_time);
            }
        }

        *last = Some(Instant::now());
    }
}
