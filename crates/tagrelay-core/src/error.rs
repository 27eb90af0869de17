//! Error taxonomy shared across the tagrelay crates.
//!
//! Hardware and transport faults are recovered locally wherever a retry or a
//! state transition is meaningful; the variants here are the typed results
//! those boundaries hand back instead of throwing.

use thiserror::Error;

/// Result type alias used throughout the tagrelay crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the reader and delivery pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The reader handle is absent or the worker has already shut down.
    /// Operations submitted in this state fail fast instead of queuing.
    #[error("Hardware not ready: {message}")]
    NotReady { message: String },

    /// A hardware operation did not complete within its deadline.
    #[error("Hardware operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Malformed tag identifier (blank TID, non-hex EPC).
    #[error("Invalid tag data: {message}")]
    InvalidTag { message: String },

    /// Filter specification the hardware cannot apply.
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },

    /// The vendor SDK reported a failure or threw during a hardware op.
    #[error("Hardware error: {message}")]
    Hardware { message: String },

    /// Connect/publish failure on the delivery transport.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Operation invoked after shutdown or outside its owning scope.
    #[error("Lifecycle error: {message}")]
    Lifecycle { message: String },
}

impl Error {
    /// Create a not-ready error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create an invalid-tag error.
    pub fn invalid_tag(message: impl Into<String>) -> Self {
        Self::InvalidTag {
            message: message.into(),
        }
    }

    /// Create an invalid-filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Create a hardware error.
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a lifecycle error.
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }
}
