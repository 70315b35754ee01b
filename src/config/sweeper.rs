//! Reconciliation sweeper configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Thirty days.
const MAX_STALLED_AFTER_SECS: u64 = 30 * 24 * 60 * 60;

/// Sweeper and scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Run the background scheduler
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between scheduled sweeps
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Sweep once at startup
    #[serde(default = "default_enabled")]
    pub run_on_start: bool,

    /// Paid charges settled per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pending charges refreshed from the provider per sweep
    #[serde(default = "default_pending_batch_size")]
    pub pending_batch_size: u32,

    /// Refresh pending charges before settling
    #[serde(default = "default_enabled")]
    pub refresh_pending: bool,

    /// Seconds after which an unapplied claim is reported as stalled
    #[serde(default = "default_stalled_after")]
    pub stalled_after_secs: u64,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stalled_after(&self) -> chrono::Duration {
        let secs = self.stalled_after_secs.min(MAX_STALLED_AFTER_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidSweeper("interval_secs must be positive"));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidSweeper("batch_size must be in 1..=1000"));
        }
        if self.pending_batch_size > 1000 {
            return Err(ValidationError::InvalidSweeper("pending_batch_size must be at most 1000"));
        }
        if self.stalled_after_secs == 0 || self.stalled_after_secs > MAX_STALLED_AFTER_SECS {
            return Err(ValidationError::InvalidSweeper(
                "stalled_after_secs must be in 1..=2592000",
            ));
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            run_on_start: default_enabled(),
            batch_size: default_batch_size(),
            pending_batch_size: default_pending_batch_size(),
            refresh_pending: default_enabled(),
            stalled_after_secs: default_stalled_after(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_batch_size() -> u32 {
    100
}

fn default_pending_batch_size() -> u32 {
    50
}

fn default_stalled_after() -> u64 {
    900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_defaults() {
        let config = SweeperConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert_eq!(config.stalled_after(), chrono::Duration::minutes(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_is_invalid() {
        let config = SweeperConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let config = SweeperConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
