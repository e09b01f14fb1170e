//! Feedback records consumed by aggregation, bias analysis and advocate
//! scoring.
//!
//! A [`Feedback`] carries the submitter's authority *as captured at
//! submission time*. Aggregation only ever reads that snapshot, so the
//! outcome of a cycle does not depend on score updates that land while the
//! cycle is being computed.

use chrono::{DateTime, Utc};
use concord_registry::PositionKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of an evaluator.
pub type UserId = String;

/// Identifier of a task.
pub type TaskId = String;

/// Evaluator metadata used by the bias analyzer. Every field is optional;
/// unknown values are skipped by the dimensions that need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorProfile {
    pub demographic_group: Option<String>,
    pub profession: Option<String>,
    pub region: Option<String>,
}

impl EvaluatorProfile {
    pub fn new(
        demographic_group: impl Into<String>,
        profession: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            demographic_group: Some(demographic_group.into()),
            profession: Some(profession.into()),
            region: Some(region.into()),
        }
    }
}

/// One evaluator's submission for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub task_id: TaskId,
    pub submitter_id: UserId,
    /// Submitter authority at submission time, in `[0, 2]`.
    pub authority_snapshot: f64,
    /// Task-type specific payload, already schema-validated.
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub profile: EvaluatorProfile,
    /// Positions this submitter took on earlier tasks, oldest first.
    #[serde(default)]
    pub prior_positions: Vec<PositionKey>,
    /// Submitted under a devil's-advocate assignment.
    #[serde(default)]
    pub is_advocate: bool,
}

impl Feedback {
    /// New feedback stamped with a fresh id and the current time.
    pub fn new(
        task_id: impl Into<TaskId>,
        submitter_id: impl Into<UserId>,
        authority_snapshot: f64,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            submitter_id: submitter_id.into(),
            authority_snapshot,
            payload,
            submitted_at: Utc::now(),
            profile: EvaluatorProfile::default(),
            prior_positions: Vec::new(),
            is_advocate: false,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn submitted_at(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = at;
        self
    }

    pub fn with_profile(mut self, profile: EvaluatorProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_prior_positions(mut self, positions: Vec<PositionKey>) -> Self {
        self.prior_positions = positions;
        self
    }

    pub fn as_advocate(mut self) -> Self {
        self.is_advocate = true;
        self
    }
}

/// Sorts feedback into canonical order: submission time, then id.
///
/// Everything order-sensitive in the council (float summation, bias
/// halves, anchoring rank) goes through this order, so a feedback *set*
/// always produces the same output regardless of how it was collected.
pub fn canonical_order(feedback: &[Feedback]) -> Vec<&Feedback> {
    let mut ordered: Vec<&Feedback> = feedback.iter().collect();
    ordered.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}
