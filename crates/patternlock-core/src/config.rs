//! Lock configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::DigestAlgorithm;
use crate::error::{PatternLockError, Result};
use crate::guard::FailurePolicy;
use crate::lockout::{LockoutSettings, MIN_PATTERN_LEN};
use crate::store::DEFAULT_FILE_NAME;

/// Main lock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Credential file name inside the data directory
    pub file_name: String,

    /// Digest algorithm for stored credentials
    pub algorithm: DigestAlgorithm,

    /// How verification treats a missing or unreadable credential
    pub failure_policy: FailurePolicy,

    /// Minimum cells accepted when enrolling a new pattern
    pub min_pattern_len: usize,

    /// Lockout thresholds
    pub lockout: LockoutSettings,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            algorithm: DigestAlgorithm::default(),
            failure_policy: FailurePolicy::default(),
            min_pattern_len: MIN_PATTERN_LEN,
            lockout: LockoutSettings::default(),
        }
    }
}

impl LockConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Set the digest algorithm
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the enrollment minimum length
    pub fn with_min_pattern_len(mut self, len: usize) -> Self {
        self.min_pattern_len = len;
        self
    }

    /// Set the lockout thresholds
    pub fn with_lockout(mut self, lockout: LockoutSettings) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(PatternLockError::InvalidConfig(
                "file_name must not be empty".to_string(),
            ));
        }
        if self.file_name.contains(['/', '\\']) || self.file_name == "." || self.file_name == ".." {
            return Err(PatternLockError::InvalidConfig(format!(
                "file_name must be a bare file name, got '{}'",
                self.file_name
            )));
        }
        let lockout = &self.lockout;
        if lockout.attempts_before_timeout == 0 || lockout.attempts_before_reset == 0 {
            return Err(PatternLockError::InvalidConfig(
                "lockout thresholds must be positive".to_string(),
            ));
        }
        if lockout.attempts_before_timeout >= lockout.attempts_before_reset {
            return Err(PatternLockError::InvalidConfig(format!(
                "attempts_before_timeout ({}) must be below attempts_before_reset ({})",
                lockout.attempts_before_timeout, lockout.attempts_before_reset
            )));
        }
        if lockout.timeout_ms == 0 {
            return Err(PatternLockError::InvalidConfig(
                "lockout timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
