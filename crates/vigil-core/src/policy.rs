//! Policy constants
//!
//! All safety interlocks are read from a [`PolicyConfig`] so that deployments
//! can audit the exact values in force. The defaults are the reference policy.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// One day in seconds
pub const DAY_SECS: u64 = 86_400;

/// Default minimum number of units between two accepted mutations
pub const MIN_UPDATE_DELAY: u64 = 1;

/// Default timelock bounds and initial value
pub const MIN_TIMELOCK_SECS: u64 = DAY_SECS;
pub const MAX_TIMELOCK_SECS: u64 = 30 * DAY_SECS;
pub const DEFAULT_TIMELOCK_SECS: u64 = 2 * DAY_SECS;

/// Default approval group bounds
pub const MIN_MEMBERS: usize = 3;
pub const MAX_MEMBERS: usize = 10;
pub const MIN_THRESHOLD: u32 = 2;

/// Default maximum number of devices per batch call
pub const MAX_BATCH_SIZE: usize = 50;

/// Time source the rate limit is measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBasis {
    /// Producer-controlled units (block height)
    #[default]
    Height,
    /// Wall-clock seconds
    WallClock,
}

/// Auditable policy values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum units between two accepted registry mutations
    pub min_update_delay: u64,

    /// Which clock reading the rate limit compares
    pub rate_limit_basis: RateLimitBasis,

    /// Lower bound for the governance timelock (seconds)
    pub min_timelock_secs: u64,

    /// Upper bound for the governance timelock (seconds)
    pub max_timelock_secs: u64,

    /// Timelock a fresh governance manager starts with (seconds)
    pub default_timelock_secs: u64,

    /// Smallest allowed approval group
    pub min_members: usize,

    /// Largest allowed approval group
    pub max_members: usize,

    /// Smallest allowed approval threshold
    pub min_threshold: u32,

    /// Largest batch a single call may carry
    pub max_batch_size: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_update_delay: MIN_UPDATE_DELAY,
            rate_limit_basis: RateLimitBasis::Height,
            min_timelock_secs: MIN_TIMELOCK_SECS,
            max_timelock_secs: MAX_TIMELOCK_SECS,
            default_timelock_secs: DEFAULT_TIMELOCK_SECS,
            min_members: MIN_MEMBERS,
            max_members: MAX_MEMBERS,
            min_threshold: MIN_THRESHOLD,
            max_batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl PolicyConfig {
    /// Check that the values are internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_update_delay == 0 {
            return Err(Error::InvalidConfig(
                "min_update_delay must be at least 1".to_string(),
            ));
        }
        if self.min_timelock_secs == 0 || self.min_timelock_secs > self.max_timelock_secs {
            return Err(Error::InvalidConfig(format!(
                "timelock bounds [{}, {}] are empty",
                self.min_timelock_secs, self.max_timelock_secs
            )));
        }
        self.validate_timelock(self.default_timelock_secs)
            .map_err(|e| Error::InvalidConfig(format!("default timelock: {}", e)))?;
        if self.min_threshold < 2 {
            return Err(Error::InvalidConfig(
                "min_threshold must be at least 2".to_string(),
            ));
        }
        if self.min_members < self.min_threshold as usize {
            return Err(Error::InvalidConfig(format!(
                "min_members {} cannot satisfy min_threshold {}",
                self.min_members, self.min_threshold
            )));
        }
        if self.max_members < self.min_members {
            return Err(Error::InvalidConfig(format!(
                "max_members {} below min_members {}",
                self.max_members, self.min_members
            )));
        }
        if self.max_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Check an approval group configuration, reporting the first rule broken
    pub fn validate_group(&self, member_count: usize, threshold: u32) -> Result<()> {
        if member_count < self.min_members {
            return Err(Error::InsufficientMembers {
                count: member_count,
                min: self.min_members,
            });
        }
        if member_count > self.max_members {
            return Err(Error::TooManyMembers {
                count: member_count,
                max: self.max_members,
            });
        }
        if threshold < self.min_threshold {
            return Err(Error::InsufficientThreshold {
                threshold,
                min: self.min_threshold,
            });
        }
        if threshold as usize > member_count {
            return Err(Error::ThresholdTooHigh {
                threshold,
                members: member_count,
            });
        }
        Ok(())
    }

    /// Check a timelock duration against the bounds
    pub fn validate_timelock(&self, secs: u64) -> Result<()> {
        if secs < self.min_timelock_secs || secs > self.max_timelock_secs {
            return Err(Error::TimelockOutOfBounds {
                secs,
                min: self.min_timelock_secs,
                max: self.max_timelock_secs,
            });
        }
        Ok(())
    }

    /// Check a batch length against the bounds
    pub fn validate_batch(&self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::EmptyBatch);
        }
        if size > self.max_batch_size {
            return Err(Error::BatchTooLarge {
                size,
                max: self.max_batch_size,
            });
        }
        Ok(())
    }

    /// Load and validate a policy file (TOML when the extension is `.toml`,
    /// JSON otherwise)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the policy to a file, format chosen by extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}
