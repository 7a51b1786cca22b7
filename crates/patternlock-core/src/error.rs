//! Error types for PatternLock Core
//!
//! This module defines all error types used throughout the core engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.
//!
//! Note that read-side failures of the credential file never show up here:
//! verification folds them into [`crate::store::VerifyOutcome`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for PatternLock operations
pub type Result<T> = std::result::Result<T, PatternLockError>;

/// Main error type for PatternLock operations
#[derive(Error, Debug)]
pub enum PatternLockError {
    /// A cell coordinate outside the 3x3 grid
    #[error("Cell ({row}, {col}) is outside the 3x3 grid")]
    InvalidCell { row: u8, col: u8 },

    /// An encoded byte that cannot come from a grid cell
    #[error("Encoded byte {0} is outside 0..=8")]
    InvalidEncodedByte(u8),

    /// Malformed pattern text from the user
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Pattern rejected by the enrollment length policy
    #[error("Pattern has {len} cells, at least {min} required")]
    PatternTooShort { len: usize, min: usize },

    /// Pattern visits the same cell twice
    #[error("Pattern visits cell ({row}, {col}) more than once")]
    RepeatedCell { row: u8, col: u8 },

    /// Writing the credential file failed
    #[error("Unable to save lock pattern to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<PatternLockError>,
    },
}

impl PatternLockError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
