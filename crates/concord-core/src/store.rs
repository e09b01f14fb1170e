//! Persistence collaborator.
//!
//! The engine never does I/O itself; it reads and writes records through a
//! [`ScoreStore`]. [`MemoryStore`] is the in-process implementation used by
//! the CLI and the tests. A database-backed store implements the same trait.
//!
//! ## Contract
//!
//! - Feedback, aggregation records and bias reports are append-only.
//! - `append_result` assigns revisions `1, 2, ...` per task.
//! - At most one feedback item and one advocate assignment exist per
//!   (task, user).
//! - Prior positions are kept per task type.

use concord_council::{AdvocateAssignment, BiasReport, Feedback, TaskId, UserId};
use concord_registry::PositionKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::model::{AggregationRecord, Task, TaskStatus, User, UserScores};
use crate::{CoreError, Result};

/// Storage operations the engine depends on.
pub trait ScoreStore: Send + Sync {
    /// Inserts a new user. Fails if the id exists.
    fn insert_user(&self, user: User) -> Result<()>;
    fn user(&self, id: &str) -> Result<User>;
    fn users(&self) -> Result<Vec<User>>;
    fn update_scores(&self, id: &str, scores: UserScores) -> Result<()>;

    /// Inserts a new task. Fails if the id exists.
    fn insert_task(&self, task: Task) -> Result<()>;
    fn task(&self, id: &str) -> Result<Task>;
    fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<()>;

    /// Fails with [`CoreError::DuplicateFeedback`] if the submitter already
    /// has feedback on the task.
    fn append_feedback(&self, feedback: Feedback) -> Result<()>;
    fn feedback_for(&self, task_id: &str) -> Result<Vec<Feedback>>;

    /// Appends an aggregation record, returning its revision.
    fn append_result(&self, task_id: &str, record: AggregationRecord) -> Result<u64>;
    /// Every aggregation record of a task, oldest first.
    fn results(&self, task_id: &str) -> Result<Vec<AggregationRecord>>;
    fn append_bias_report(&self, report: BiasReport) -> Result<()>;
    fn bias_reports(&self, task_id: &str) -> Result<Vec<BiasReport>>;

    /// Fails with [`CoreError::DuplicateAssignment`] if (task, user) exists.
    fn insert_assignment(&self, assignment: AdvocateAssignment) -> Result<()>;
    fn assignments(&self, task_id: &str) -> Result<Vec<AdvocateAssignment>>;
    fn set_effectiveness(&self, task_id: &str, user_id: &str, score: f64) -> Result<()>;

    /// Records the position a user took on an aggregated task.
    fn record_position(
        &self,
        user_id: &str,
        task_id: &str,
        task_type: &str,
        position: PositionKey,
    ) -> Result<()>;
    /// Positions a user took on earlier tasks of the same type, oldest first.
    ///
    /// Position keys are only comparable within one task type.
    fn prior_positions(&self, user_id: &str, task_type: &str) -> Result<Vec<PositionKey>>;

    /// Most recent aggregation record, if any.
    fn latest_result(&self, task_id: &str) -> Result<Option<AggregationRecord>> {
        Ok(self.results(task_id)?.pop())
    }
}

#[derive(Debug, Clone)]
struct RecordedPosition {
    task_id: TaskId,
    task_type: String,
    position: PositionKey,
}

/// In-memory [`ScoreStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    tasks: DashMap<TaskId, Task>,
    feedback: DashMap<TaskId, Vec<Feedback>>,
    results: DashMap<TaskId, Vec<AggregationRecord>>,
    bias: DashMap<TaskId, Vec<BiasReport>>,
    assignments: DashMap<(TaskId, UserId), AdvocateAssignment>,
    positions: DashMap<UserId, Vec<RecordedPosition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScoreStore for MemoryStore {
    fn insert_user(&self, user: User) -> Result<()> {
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(CoreError::AlreadyExists {
                kind: "user",
                id: user.id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    fn user(&self, id: &str) -> Result<User> {
        self.users
            .get(id)
            .map(|u| u.value().clone())
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    fn users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    fn update_scores(&self, id: &str, scores: UserScores) -> Result<()> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("user", id))?;
        user.scores = scores;
        Ok(())
    }

    fn insert_task(&self, task: Task) -> Result<()> {
        match self.tasks.entry(task.id.clone()) {
            Entry::Occupied(_) => Err(CoreError::AlreadyExists {
                kind: "task",
                id: task.id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    fn task(&self, id: &str) -> Result<Task> {
        self.tasks
            .get(id)
            .map(|t| t.value().clone())
            .ok_or_else(|| CoreError::not_found("task", id))
    }

    fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("task", id))?;
        task.status = status;
        Ok(())
    }

    fn append_feedback(&self, feedback: Feedback) -> Result<()> {
        let mut items = self.feedback.entry(feedback.task_id.clone()).or_default();
        if items.iter().any(|f| f.submitter_id == feedback.submitter_id) {
            return Err(CoreError::DuplicateFeedback {
                task_id: feedback.task_id,
                user_id: feedback.submitter_id,
            });
        }
        items.push(feedback);
        Ok(())
    }

    fn feedback_for(&self, task_id: &str) -> Result<Vec<Feedback>> {
        Ok(self
            .feedback
            .get(task_id)
            .map(|f| f.value().clone())
            .unwrap_or_default())
    }

    fn append_result(&self, task_id: &str, mut record: AggregationRecord) -> Result<u64> {
        let mut records = self.results.entry(task_id.to_string()).or_default();
        let revision = records.len() as u64 + 1;
        record.revision = revision;
        records.push(record);
        Ok(revision)
    }

    fn results(&self, task_id: &str) -> Result<Vec<AggregationRecord>> {
        Ok(self
            .results
            .get(task_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn append_bias_report(&self, report: BiasReport) -> Result<()> {
        self.bias
            .entry(report.task_id.clone())
            .or_default()
            .push(report);
        Ok(())
    }

    fn bias_reports(&self, task_id: &str) -> Result<Vec<BiasReport>> {
        Ok(self
            .bias
            .get(task_id)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn insert_assignment(&self, assignment: AdvocateAssignment) -> Result<()> {
        let key = (assignment.task_id.clone(), assignment.user_id.clone());
        match self.assignments.entry(key) {
            Entry::Occupied(_) => Err(CoreError::DuplicateAssignment {
                task_id: assignment.task_id,
                user_id: assignment.user_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(assignment);
                Ok(())
            }
        }
    }

    fn assignments(&self, task_id: &str) -> Result<Vec<AdvocateAssignment>> {
        let mut found: Vec<AdvocateAssignment> = self
            .assignments
            .iter()
            .filter(|a| a.task_id == task_id)
            .map(|a| a.value().clone())
            .collect();
        found.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(found)
    }

    fn set_effectiveness(&self, task_id: &str, user_id: &str, score: f64) -> Result<()> {
        let key = (task_id.to_string(), user_id.to_string());
        let mut assignment = self
            .assignments
            .get_mut(&key)
            .ok_or_else(|| CoreError::not_found("advocate assignment", format!("{}/{}", task_id, user_id)))?;
        assignment.effectiveness_score = Some(score);
        Ok(())
    }

    fn record_position(
        &self,
        user_id: &str,
        task_id: &str,
        task_type: &str,
        position: PositionKey,
    ) -> Result<()> {
        let mut entries = self.positions.entry(user_id.to_string()).or_default();
        match entries.iter_mut().find(|e| e.task_id == task_id) {
            Some(entry) => entry.position = position,
            None => entries.push(RecordedPosition {
                task_id: task_id.to_string(),
                task_type: task_type.to_string(),
                position,
            }),
        }
        Ok(())
    }

    fn prior_positions(&self, user_id: &str, task_type: &str) -> Result<Vec<PositionKey>> {
        Ok(self
            .positions
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.task_type == task_type)
                    .map(|e| e.position.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
