//! Pool health and statistics

use std::collections::BTreeMap;

use serde::Serialize;

use crate::agents::{AgentStatus, AgentType};

// ============================================================================
// Health Status
// ============================================================================

/// Overall pool health
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolHealth {
    /// At least 80% of tracked workers are not carrying a failure
    Healthy,

    /// At least 50%, but under 80%
    Degraded,

    /// Under 50%
    Unhealthy,
}

impl PoolHealth {
    /// Classify from tracked and failure-carrying worker counts
    ///
    /// An empty pool is healthy. Integer arithmetic keeps the 80% and 50%
    /// boundaries exact.
    #[must_use]
    pub fn from_counts(total: usize, failed: usize) -> Self {
        if total == 0 {
            return Self::Healthy;
        }
        let ok = total.saturating_sub(failed);
        if ok * 5 >= total * 4 {
            Self::Healthy
        } else if ok * 2 >= total {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }

    /// Check if the pool should keep accepting traffic
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot returned by `AgentPool::get_statistics`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatistics {
    /// Live workers, idle and checked out
    pub total_workers: usize,
    /// Live workers per agent type
    pub agent_types: BTreeMap<AgentType, usize>,
    /// Live workers per current status
    pub status_counts: BTreeMap<AgentStatus, usize>,
    /// Workers whose last outcome was FAILED
    pub failure_carrying: usize,
    /// Workers waiting in idle lists
    pub idle_workers: usize,
    /// Requests waiting in the intake queue
    pub queue_size: usize,
    /// Requests currently inside `process_request`
    pub in_flight: usize,
    /// Requests finished since initialization
    pub requests_processed: u64,
}
