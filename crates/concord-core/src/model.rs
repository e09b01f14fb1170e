//! Domain records owned by the persistence collaborator.
//!
//! The engine reads these, derives new scores and results from them, and
//! writes the derived values back through [`ScoreStore`](crate::ScoreStore).

use chrono::{DateTime, Utc};
use concord_council::{AggregationResult, EvaluatorProfile, TaskId, UserId};
use concord_registry::{PositionKey, TaskTypeDefinition};
use concord_scoring::Credential;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{CoreError, Result};

/// Track record assigned to a user with no history.
pub const INITIAL_TRACK_RECORD: f64 = 0.5;

/// The three scores the engine maintains per user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserScores {
    /// Current aggregation weight, in `[0, 2]`.
    pub authority: f64,
    /// Credential-derived baseline, in `[0, 2]`.
    pub baseline: f64,
    /// Smoothed historical quality, in `[0, 1]`.
    pub track_record: f64,
}

/// An evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub scores: UserScores,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub profile: EvaluatorProfile,
}

/// Task lifecycle. Transitions only move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Open,
    BlindEvaluation,
    Aggregated,
    Closed,
}

impl TaskStatus {
    /// Whether feedback may still be submitted.
    pub fn accepts_feedback(self) -> bool {
        matches!(self, Self::Open | Self::BlindEvaluation)
    }

    /// Whether `next` is a legal transition from `self`.
    ///
    /// Aggregation may run straight from `OPEN`; an untouched task can still
    /// be aggregated (and fail for lack of feedback).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::BlindEvaluation)
                | (Self::Open, Self::Aggregated)
                | (Self::BlindEvaluation, Self::Aggregated)
                | (Self::Aggregated, Self::Closed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::BlindEvaluation => "BLIND_EVALUATION",
            Self::Aggregated => "AGGREGATED",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// A task awaiting, or holding, feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Registry tag.
    pub task_type: String,
    pub status: TaskStatus,
    /// Input visible to evaluators.
    pub input_data: Value,
    /// Withheld until the task is aggregated.
    pub ground_truth_data: Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Validates `input` and splits off the task type's ground truth.
    pub fn new(id: impl Into<TaskId>, definition: &TaskTypeDefinition, input: &Value) -> Result<Self> {
        definition.validate_input(input)?;
        let (input_data, ground_truth_data) = definition.split_ground_truth(input);
        Ok(Self {
            id: id.into(),
            task_type: definition.tag.clone(),
            status: TaskStatus::Open,
            input_data,
            ground_truth_data,
            created_at: Utc::now(),
        })
    }

    /// Moves to `next`, or fails without changing anything.
    pub fn advance(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// What an evaluator may see.
    pub fn public_view(&self) -> PublicTaskView {
        let revealed = matches!(self.status, TaskStatus::Aggregated | TaskStatus::Closed);
        PublicTaskView {
            id: self.id.clone(),
            task_type: self.task_type.clone(),
            status: self.status,
            input_data: self.input_data.clone(),
            ground_truth_data: revealed.then(|| self.ground_truth_data.clone()),
        }
    }
}

/// Evaluator-facing projection of a [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTaskView {
    pub id: TaskId,
    pub task_type: String,
    pub status: TaskStatus,
    pub input_data: Value,
    /// `None` until the task is aggregated.
    pub ground_truth_data: Option<Value>,
}

/// One persisted aggregation. Records are never mutated; re-aggregation
/// appends a new revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRecord {
    /// 1 for the first aggregation of a task. Assigned by the store.
    pub revision: u64,
    pub aggregated_at: DateTime<Utc>,
    /// Configuration snapshot the result was computed under.
    pub config_version: u64,
    pub primary_position: PositionKey,
    /// δ exceeded the discussion threshold.
    pub needs_discussion: bool,
    pub result: AggregationResult,
}

/// A user's score change from one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub user_id: UserId,
    pub previous: UserScores,
    pub current: UserScores,
    /// Mean quality of the user's feedback this cycle.
    pub quality: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_registry::TaskTypeRegistry;
    use serde_json::json;

    fn classification_task() -> Task {
        let registry = TaskTypeRegistry::with_builtins();
        let def = registry.get("classification").unwrap();
        Task::new(
            "t1",
            &def,
            &json!({"item": "Win a free cruise", "true_label": "spam"}),
        )
        .unwrap()
    }

    #[test]
    fn test_task_splits_ground_truth() {
        let task = classification_task();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.input_data, json!({"item": "Win a free cruise"}));
        assert_eq!(task.ground_truth_data, json!({"true_label": "spam"}));
    }

    #[test]
    fn test_task_rejects_invalid_input() {
        let registry = TaskTypeRegistry::with_builtins();
        let def = registry.get("classification").unwrap();
        assert!(matches!(
            Task::new("t1", &def, &json!({"true_label": "spam"})),
            Err(CoreError::Registry(_))
        ));
    }

    #[test]
    fn test_lifecycle_is_linear() {
        let mut task = classification_task();
        task.advance(TaskStatus::BlindEvaluation).unwrap();
        task.advance(TaskStatus::Aggregated).unwrap();
        assert!(task.advance(TaskStatus::BlindEvaluation).is_err());
        assert!(task.advance(TaskStatus::Open).is_err());
        task.advance(TaskStatus::Closed).unwrap();
        let err = task.advance(TaskStatus::Aggregated).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Closed);
    }

    #[test]
    fn test_no_self_transitions() {
        for status in [
            TaskStatus::Open,
            TaskStatus::BlindEvaluation,
            TaskStatus::Aggregated,
            TaskStatus::Closed,
        ] {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_ground_truth_withheld_until_aggregated() {
        let mut task = classification_task();
        assert_eq!(task.public_view().ground_truth_data, None);
        task.advance(TaskStatus::BlindEvaluation).unwrap();
        assert_eq!(task.public_view().ground_truth_data, None);
        task.advance(TaskStatus::Aggregated).unwrap();
        assert_eq!(
            task.public_view().ground_truth_data,
            Some(json!({"true_label": "spam"}))
        );
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::BlindEvaluation).unwrap(),
            "\"BLIND_EVALUATION\""
        );
        assert_eq!(TaskStatus::Aggregated.to_string(), "AGGREGATED");
    }
}
