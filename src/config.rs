//! Pipeline tunables.
//!
//! Values are injected by the caller (the CLI builds them from flags and
//! environment); nothing here reads the environment itself.

use std::time::Duration;

use crate::models::MAX_RANK;
use crate::retry::{Backoff, RetryPolicy};

/// Entries per committed transaction.
pub const DEFAULT_BATCH_SIZE: usize = 25;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Minimum gap between two calls to the same provider.
pub const DEFAULT_CALL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub batch_size: usize,
    /// Parallel enrichment workers. 1 keeps the pipeline strictly sequential.
    pub workers: usize,
    pub max_rank: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
            max_rank: MAX_RANK,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Double the delay after every retry instead of keeping it fixed.
    pub exponential: bool,
    pub call_interval: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            exponential: false,
            call_interval: DEFAULT_CALL_INTERVAL,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let backoff = if self.exponential {
            Backoff::Exponential {
                initial: self.retry_delay,
                max: self.retry_delay * 8,
            }
        } else {
            Backoff::Fixed(self.retry_delay)
        };
        RetryPolicy::new(self.max_retries, backoff)
    }
}
