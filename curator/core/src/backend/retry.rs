//! Retry policy for routing calls
//!
//! How many attempts a request gets comes from `AgentRequest::max_retries`;
//! this type decides which failures are worth another attempt and how long to
//! wait between them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RoutingError;

/// Backoff and retryability settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial backoff delay
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f32,

    /// Add jitter to backoff
    pub use_jitter: bool,

    /// Retry on these status codes
    pub retry_status_codes: Vec<u16>,

    /// Retry on connection errors
    pub retry_on_connection_error: bool,

    /// Retry on timeout
    pub retry_on_timeout: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
            retry_status_codes: vec![429, 500, 502, 503, 504],
            retry_on_connection_error: true,
            retry_on_timeout: true,
        }
    }
}

impl RetryConfig {
    /// Calculate backoff duration for attempt N (0-indexed)
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * f64::from(self.backoff_multiplier).powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64);

        let duration_ms = if self.use_jitter {
            // Add up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25;
            (capped * (1.0 + jitter)) as u64
        } else {
            capped as u64
        };

        Duration::from_millis(duration_ms)
    }

    /// Check if a status code should trigger a retry
    #[must_use]
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Whether another attempt could succeed after `error`
    #[must_use]
    pub fn is_retryable(&self, error: &RoutingError) -> bool {
        match error {
            RoutingError::Network(_) => self.retry_on_connection_error,
            RoutingError::Timeout => self.retry_on_timeout,
            RoutingError::Status { status, .. } => self.should_retry_status(*status),
            RoutingError::InvalidResponse(_) | RoutingError::Client(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            use_jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(250));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(config.backoff_for_attempt(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = config.backoff_for_attempt(1).as_millis();
            assert!((500..=625).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_retryable_classification() {
        let config = RetryConfig::default();
        assert!(config.is_retryable(&RoutingError::Network("reset".into())));
        assert!(config.is_retryable(&RoutingError::Timeout));
        assert!(config.is_retryable(&RoutingError::Status {
            status: 503,
            body: String::new()
        }));
        assert!(!config.is_retryable(&RoutingError::Status {
            status: 401,
            body: String::new()
        }));
        assert!(!config.is_retryable(&RoutingError::InvalidResponse("bad".into())));
    }
}
