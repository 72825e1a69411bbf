//! Upload configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, UploadError};

/// Default part size (5 MiB)
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest part an object store accepts (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Settings for one orchestrator instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size of every part except possibly the last
    pub part_size: u64,
    pub retry: RetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            part_size: DEFAULT_PART_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadConfig {
    /// Config with the given part size and default retry policy
    pub fn with_part_size(part_size: u64) -> Self {
        UploadConfig {
            part_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(UploadError::Config("part size must be positive".to_string()));
        }

        if self.part_size > MAX_PART_SIZE {
            return Err(UploadError::Config(format!(
                "part size {} exceeds maximum {}",
                self.part_size, MAX_PART_SIZE
            )));
        }

        if usize::try_from(self.part_size).is_err() {
            return Err(UploadError::Config(format!(
                "part size {} does not fit in memory on this platform",
                self.part_size
            )));
        }

        self.retry.validate()
    }
}

/// Bounded exponential backoff for transient store failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, first try included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retry
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(UploadError::Config(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(UploadError::Config(
                "initial backoff exceeds maximum backoff".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1 = first retry).
    ///
    /// delay = min(initial * 2^(attempt-1), max) plus up to 25% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = base.min(self.max_backoff);

        let jitter_pct = rand::random::<u64>() % 26;
        let jitter_ms = (capped.as_millis() as u64) * jitter_pct / 100;
        capped + Duration::from_millis(jitter_ms)
    }
}
