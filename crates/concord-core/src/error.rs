//! Error types for the consensus engine.

use crate::model::TaskStatus;
use thiserror::Error;

/// Core error type for engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration candidate failed validation or compilation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Another aggregation of the same task is running.
    #[error("Aggregation already in progress for task '{0}'")]
    AggregationInProgress(String),

    /// The task lifecycle does not allow this step.
    #[error("Task '{task_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Re-aggregation needs an existing aggregation.
    #[error("Task '{task_id}' is {status}; only AGGREGATED tasks can be re-aggregated")]
    NotAggregated { task_id: String, status: TaskStatus },

    /// The task no longer accepts feedback.
    #[error("Task '{task_id}' is {status} and does not accept feedback")]
    FeedbackClosed { task_id: String, status: TaskStatus },

    /// A record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with this id already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// The user already submitted feedback on the task.
    #[error("User '{user_id}' already submitted feedback on task '{task_id}'")]
    DuplicateFeedback { task_id: String, user_id: String },

    /// The user already holds an advocate assignment for the task.
    #[error("User '{user_id}' is already assigned as advocate on task '{task_id}'")]
    DuplicateAssignment { task_id: String, user_id: String },

    /// Background execution failed.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Registry error passthrough.
    #[error("Registry error: {0}")]
    Registry(#[from] concord_registry::RegistryError),

    /// Scoring configuration error passthrough.
    #[error("Scoring error: {0}")]
    Scoring(#[from] concord_scoring::ScoringError),

    /// Council error passthrough.
    #[error("Council error: {0}")]
    Council(#[from] concord_council::CouncilError),
}

impl CoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// The task had nothing to aggregate.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            Self::Council(concord_council::CouncilError::InsufficientData { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_council::CouncilError;

    #[test]
    fn test_transition_message_names_states() {
        let err = CoreError::InvalidTransition {
            task_id: "t1".into(),
            from: TaskStatus::Closed,
            to: TaskStatus::Aggregated,
        };
        assert_eq!(
            err.to_string(),
            "Task 't1' cannot move from CLOSED to AGGREGATED"
        );
    }

    #[test]
    fn test_insufficient_data_detection() {
        let err: CoreError = CouncilError::InsufficientData {
            task_id: "t1".into(),
            reason: "no feedback submitted".into(),
        }
        .into();
        assert!(err.is_insufficient_data());
        assert!(!CoreError::not_found("task", "t1").is_insufficient_data());
    }
}
