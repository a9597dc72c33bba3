//! Retry policy for serialization conflicts.
//!
//! The generator core never loops on contention itself. Instead the whole
//! transactional attempt is handed to [`retry_on_conflict`], which restarts
//! it from the beginning while the error is retryable.

use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};

use crate::contracts::SequenceError;

/// Configuration for conflict retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Creates a RetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DOCSEQ_MAX_RETRIES`: Maximum retry attempts (default: 5)
    /// - `DOCSEQ_RETRY_INITIAL_MS`: Initial backoff delay in ms (default: 10)
    /// - `DOCSEQ_RETRY_MAX_MS`: Maximum backoff delay in ms (default: 500)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        Self {
            max_retries: var("DOCSEQ_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_retries),
            initial_delay_ms: var("DOCSEQ_RETRY_INITIAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.initial_delay_ms),
            max_delay_ms: var("DOCSEQ_RETRY_MAX_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_delay_ms),
        }
    }

    /// Creates an exponential backoff builder with jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Runs `op`, restarting it while it fails with a retryable error.
///
/// Non-retryable errors are returned immediately. Once the budget in
/// `config` is spent the last error is returned as-is.
pub fn retry_on_conflict<T, F>(config: &RetryConfig, name: &str, op: F) -> Result<T, SequenceError>
where
    F: FnMut() -> Result<T, SequenceError>,
{
    op.retry(config.backoff())
        .sleep(std::thread::sleep)
        .when(SequenceError::is_retryable)
        .notify(|err: &SequenceError, dur: Duration| {
            tracing::warn!(
                sequence = %name,
                error = %err,
                retry_in = ?dur,
                "Sequence increment conflicted, restarting transaction"
            );
        })
        .call()
}
