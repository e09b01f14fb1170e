//! Error types for the council components.
//!
//! Aggregation is the only fallible step at runtime; bias analysis and
//! advocate scoring degrade instead of failing.

use concord_registry::RegistryError;
use thiserror::Error;

/// Result type alias for council operations.
pub type Result<T> = std::result::Result<T, CouncilError>;

/// Errors that can occur during council operations.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Nothing to aggregate: no feedback, or none with a derivable position.
    #[error("insufficient data to aggregate task '{task_id}': {reason}")]
    InsufficientData {
        /// Task being aggregated.
        task_id: String,
        /// What was missing.
        reason: String,
    },

    /// A council configuration section failed validation.
    #[error("invalid council configuration: {0}")]
    InvalidConfig(String),

    /// Registry lookup or canonicalization failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CouncilError {
    pub(crate) fn insufficient(task_id: &str, reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            task_id: task_id.to_string(),
            reason: reason.into(),
        }
    }
}
