//! The consensus engine facade.
//!
//! [`ConsensusEngine`] owns the live configuration, the task-type registry
//! and the store, and runs one task cycle end to end:
//!
//! ```text
//!   capture_feedback ──► store (append-only, authority snapshot taken here)
//!                              │
//!   process_task ─────────────►│ aggregate ─► persist result + bias report
//!     (one per task at a time) │                   │
//!                              ▼                   ▼
//!                   status → AGGREGATED    per-user score updates
//!                                           (serialized per user)
//! ```
//!
//! ## Concurrency
//!
//! - A second `process_task`/`reaggregate` on a task that is already being
//!   aggregated fails with [`CoreError::AggregationInProgress`].
//! - Feedback capture and status transitions of one task are serialized;
//!   feedback for different tasks is captured in parallel.
//! - Score writes for one user are serialized; different users update in
//!   parallel.
//!
//! Every operation reads one configuration snapshot up front and uses it
//! throughout, so a concurrent reload never splits a cycle across two
//! configurations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use concord_council::{
    canonical_order, AdvocateAssignment, AggregationOutcome, BiasReport, Candidate,
    ConsistencyScore, EffectivenessReport, EvaluatorProfile, Feedback, UserId,
};
use concord_registry::{TaskTypeDefinition, TaskTypeRegistry};
use concord_scoring::Credential;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    live_config::{ConfigSnapshot, LiveConfig},
    locks::{InFlight, KeyedLocks},
    model::{
        AggregationRecord, PublicTaskView, ScoreUpdate, Task, TaskStatus, User, UserScores,
        INITIAL_TRACK_RECORD,
    },
    store::{MemoryStore, ScoreStore},
    CoreError, Result,
};

/// What one `process_task` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub record: AggregationRecord,
    pub bias: BiasReport,
    /// One entry per submitter, ordered by user id.
    pub updates: Vec<ScoreUpdate>,
    /// Feedback that could not be clustered.
    pub excluded: Vec<Uuid>,
}

/// Authority-weighted feedback consensus engine.
///
/// # Example
///
/// ```rust
/// use concord_core::{ConsensusEngine, EngineConfig};
/// use serde_json::json;
///
/// let engine = ConsensusEngine::in_memory(EngineConfig::default())?;
/// engine.register_user("alice", Vec::new(), Default::default())?;
/// engine.create_task("t1", "classification", &json!({"item": "Win a cruise!"}))?;
/// engine.capture_feedback("t1", "alice", json!({"label": "spam"}))?;
///
/// let report = engine.process_task("t1")?;
/// assert_eq!(report.record.result.primary_answer, json!({"label": "spam"}));
/// # Ok::<(), concord_core::CoreError>(())
/// ```
pub struct ConsensusEngine<S = MemoryStore> {
    config: LiveConfig,
    registry: RwLock<TaskTypeRegistry>,
    store: S,
    in_flight: InFlight,
    task_state: KeyedLocks,
    user_scores: KeyedLocks,
}

impl ConsensusEngine<MemoryStore> {
    /// An engine over a fresh [`MemoryStore`] with the built-in task types.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(config, TaskTypeRegistry::with_builtins(), MemoryStore::new())
    }
}

impl<S: ScoreStore> ConsensusEngine<S> {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] if `config` does not validate or compile.
    pub fn new(config: EngineConfig, registry: TaskTypeRegistry, store: S) -> Result<Self> {
        let config = LiveConfig::new(config)?;
        info!(
            version = config.version(),
            task_types = registry.len(),
            "consensus engine initialized"
        );
        Ok(Self {
            config,
            registry: RwLock::new(registry),
            store,
            in_flight: InFlight::new(),
            task_state: KeyedLocks::new(),
            user_scores: KeyedLocks::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Validates `candidate` and swaps it in. The prior configuration stays
    /// active if it is rejected.
    pub fn reload_config(&self, candidate: EngineConfig) -> Result<u64> {
        self.config.reload(candidate)
    }

    pub fn config_version(&self) -> u64 {
        self.config.version()
    }

    pub fn config_snapshot(&self) -> Arc<ConfigSnapshot> {
        self.config.current()
    }

    /// Adds a task type at runtime.
    pub fn register_task_type(&self, definition: TaskTypeDefinition) -> Result<()> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let tag = definition.tag.clone();
        registry.register(definition)?;
        info!(task_type = %tag, "task type registered");
        Ok(())
    }

    pub fn task_types(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.tags().into_iter().map(str::to_string).collect()
    }

    fn definition(&self, tag: &str) -> Result<Arc<TaskTypeDefinition>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        Ok(registry.get(tag)?)
    }

    // =========================================================================
    // USERS AND TASKS
    // =========================================================================

    /// Registers an evaluator. Baseline comes from the credentials, the
    /// track record starts at [`INITIAL_TRACK_RECORD`].
    pub fn register_user(
        &self,
        user_id: impl Into<UserId>,
        credentials: Vec<Credential>,
        profile: EvaluatorProfile,
    ) -> Result<User> {
        let snapshot = self.config.current();
        let baseline = snapshot.credentials.score(&credentials);
        let track_record = INITIAL_TRACK_RECORD;
        let authority = snapshot
            .authority
            .compute(baseline, track_record, INITIAL_TRACK_RECORD);
        let user = User {
            id: user_id.into(),
            scores: UserScores {
                authority,
                baseline,
                track_record,
            },
            credentials,
            profile,
        };
        self.store.insert_user(user.clone())?;
        debug!(user_id = %user.id, baseline, authority, "user registered");
        Ok(user)
    }

    pub fn user(&self, user_id: &str) -> Result<User> {
        self.store.user(user_id)
    }

    /// Creates an `OPEN` task, splitting the task type's ground truth off
    /// the input.
    pub fn create_task(&self, task_id: &str, task_type: &str, input: &Value) -> Result<Task> {
        let definition = self.definition(task_type)?;
        let task = Task::new(task_id, &definition, input)?;
        self.store.insert_task(task.clone())?;
        debug!(task_id, task_type, "task created");
        Ok(task)
    }

    pub fn task(&self, task_id: &str) -> Result<Task> {
        self.store.task(task_id)
    }

    /// The task as evaluators may see it; ground truth only once aggregated.
    pub fn public_task_view(&self, task_id: &str) -> Result<PublicTaskView> {
        Ok(self.store.task(task_id)?.public_view())
    }

    /// Moves an `AGGREGATED` task to `CLOSED`.
    pub fn close_task(&self, task_id: &str) -> Result<Task> {
        self.task_state.with(task_id, || {
            let mut task = self.store.task(task_id)?;
            task.advance(TaskStatus::Closed)?;
            self.store.set_task_status(task_id, task.status)?;
            info!(task_id, "task closed");
            Ok(task)
        })
    }

    // =========================================================================
    // FEEDBACK
    // =========================================================================

    /// Records one submission.
    ///
    /// The payload must match the task type's feedback schema. The
    /// submitter's authority is captured now and never re-read by
    /// aggregation. Each user submits at most once per task. The first
    /// submission moves the task to `BLIND_EVALUATION`.
    pub fn capture_feedback(&self, task_id: &str, user_id: &str, payload: Value) -> Result<Feedback> {
        self.task_state.with(task_id, || {
            let mut task = self.store.task(task_id)?;
            if !task.status.accepts_feedback() {
                return Err(CoreError::FeedbackClosed {
                    task_id: task_id.to_string(),
                    status: task.status,
                });
            }
            let definition = self.definition(&task.task_type)?;
            definition.validate_feedback(&payload)?;

            let user = self.store.user(user_id)?;
            let prior_positions = self.store.prior_positions(user_id, &task.task_type)?;
            let is_advocate = self
                .store
                .assignments(task_id)?
                .iter()
                .any(|a| a.user_id == user_id);

            let mut feedback = Feedback::new(task_id, user_id, user.scores.authority, payload)
                .with_profile(user.profile)
                .with_prior_positions(prior_positions);
            if is_advocate {
                feedback = feedback.as_advocate();
            }
            self.store.append_feedback(feedback.clone())?;

            if task.status == TaskStatus::Open {
                task.advance(TaskStatus::BlindEvaluation)?;
                self.store.set_task_status(task_id, task.status)?;
            }
            debug!(
                task_id,
                user_id,
                authority = feedback.authority_snapshot,
                is_advocate,
                "feedback captured"
            );
            Ok(feedback)
        })
    }

    pub fn feedback(&self, task_id: &str) -> Result<Vec<Feedback>> {
        self.store.feedback_for(task_id)
    }

    // =========================================================================
    // AGGREGATION
    // =========================================================================

    /// Runs one aggregation cycle.
    ///
    /// Aggregates the task's feedback, persists the result and bias report,
    /// moves the task to `AGGREGATED`, then updates every submitter's track
    /// record and authority.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AggregationInProgress`] if the task is already being
    ///   aggregated
    /// - [`CoreError::InvalidTransition`] if the task is already aggregated
    ///   or closed
    /// - [`CoreError::Council`] with `InsufficientData` if there is nothing to
    ///   aggregate; nothing is persisted and the status is unchanged
    pub fn process_task(&self, task_id: &str) -> Result<ProcessReport> {
        let _running = self
            .in_flight
            .try_acquire(task_id)
            .ok_or_else(|| CoreError::AggregationInProgress(task_id.to_string()))?;
        let snapshot = self.config.current();

        let (record, bias, outcome, task_type) = self.task_state.with(task_id, || {
            let mut task = self.store.task(task_id)?;
            task.advance(TaskStatus::Aggregated)?;
            let definition = self.definition(&task.task_type)?;
            let feedback = self.store.feedback_for(task_id)?;

            let outcome = snapshot.aggregator.aggregate(task_id, &definition, &feedback)?;
            let bias = snapshot.bias.analyze(task_id, &definition, &feedback);
            let record = self.persist(&snapshot, task_id, &outcome, &bias)?;
            self.store.set_task_status(task_id, task.status)?;
            Ok::<_, CoreError>((record, bias, outcome, task.task_type))
        })?;

        let updates = self.apply_scores(&snapshot, &outcome.consistency)?;
        for score in &outcome.consistency {
            if let Some(position) = &score.position {
                self.store.record_position(
                    &score.submitter_id,
                    task_id,
                    &task_type,
                    position.clone(),
                )?;
            }
        }

        info!(
            task_id,
            revision = record.revision,
            users_updated = updates.len(),
            bias_level = %bias.level,
            "task processed"
        );
        Ok(ProcessReport {
            record,
            bias,
            updates,
            excluded: outcome.excluded,
        })
    }

    /// Aggregates an `AGGREGATED` task again under the current configuration
    /// and appends the result as a new revision. User scores are untouched.
    pub fn reaggregate(&self, task_id: &str) -> Result<AggregationRecord> {
        let _running = self
            .in_flight
            .try_acquire(task_id)
            .ok_or_else(|| CoreError::AggregationInProgress(task_id.to_string()))?;
        let snapshot = self.config.current();

        self.task_state.with(task_id, || {
            let task = self.store.task(task_id)?;
            if task.status != TaskStatus::Aggregated {
                return Err(CoreError::NotAggregated {
                    task_id: task_id.to_string(),
                    status: task.status,
                });
            }
            let definition = self.definition(&task.task_type)?;
            let feedback = self.store.feedback_for(task_id)?;
            let outcome = snapshot.aggregator.aggregate(task_id, &definition, &feedback)?;
            let bias = snapshot.bias.analyze(task_id, &definition, &feedback);
            let record = self.persist(&snapshot, task_id, &outcome, &bias)?;
            info!(task_id, revision = record.revision, "task re-aggregated");
            Ok(record)
        })
    }

    pub fn results(&self, task_id: &str) -> Result<Vec<AggregationRecord>> {
        self.store.results(task_id)
    }

    pub fn latest_result(&self, task_id: &str) -> Result<Option<AggregationRecord>> {
        self.store.latest_result(task_id)
    }

    pub fn bias_reports(&self, task_id: &str) -> Result<Vec<BiasReport>> {
        self.store.bias_reports(task_id)
    }

    fn persist(
        &self,
        snapshot: &ConfigSnapshot,
        task_id: &str,
        outcome: &AggregationOutcome,
        bias: &BiasReport,
    ) -> Result<AggregationRecord> {
        let mut record = AggregationRecord {
            revision: 0,
            aggregated_at: Utc::now(),
            config_version: snapshot.version(),
            primary_position: outcome.primary_position.clone(),
            needs_discussion: outcome.needs_discussion,
            result: outcome.result.clone(),
        };
        record.revision = self.store.append_result(task_id, record.clone())?;
        self.store.append_bias_report(bias.clone())?;
        if outcome.needs_discussion {
            info!(
                task_id,
                disagreement = outcome.result.disagreement_score,
                "task flagged for structured discussion"
            );
        }
        Ok(record)
    }

    /// One track-record and authority update per submitter.
    fn apply_scores(
        &self,
        snapshot: &ConfigSnapshot,
        consistency: &[ConsistencyScore],
    ) -> Result<Vec<ScoreUpdate>> {
        let mut by_user: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for score in consistency {
            by_user
                .entry(score.submitter_id.as_str())
                .or_default()
                .push(score.quality);
        }

        let mut updates = Vec::with_capacity(by_user.len());
        for (user_id, qualities) in by_user {
            let quality = qualities.iter().sum::<f64>() / qualities.len() as f64;
            let update = self.user_scores.with(user_id, || {
                let user = match self.store.user(user_id) {
                    Ok(user) => user,
                    Err(CoreError::NotFound { .. }) => {
                        warn!(user_id, "feedback from unknown user, scores not updated");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };
                let previous = user.scores;
                let baseline = snapshot.credentials.score(&user.credentials);
                let track_record = snapshot.track_record.update(previous.track_record, quality);
                let authority = snapshot.authority.compute(baseline, track_record, quality);
                let current = UserScores {
                    authority,
                    baseline,
                    track_record,
                };
                self.store.update_scores(user_id, current)?;
                debug!(
                    user_id,
                    quality,
                    track_record,
                    authority,
                    "user scores updated"
                );
                Ok(Some(ScoreUpdate {
                    user_id: user_id.to_string(),
                    previous,
                    current,
                    quality,
                }))
            })?;
            updates.extend(update);
        }
        Ok(updates)
    }

    // =========================================================================
    // DEVIL'S ADVOCATES
    // =========================================================================

    /// Draws devil's advocates for a task that still accepts feedback.
    ///
    /// Every registered user with authority above the eligibility floor and
    /// no existing assignment on this task is drawn independently.
    pub fn assign_advocates<R: Rng + ?Sized>(
        &self,
        task_id: &str,
        rng: &mut R,
    ) -> Result<Vec<AdvocateAssignment>> {
        let snapshot = self.config.current();
        self.task_state.with(task_id, || {
            let task = self.store.task(task_id)?;
            if !task.status.accepts_feedback() {
                return Err(CoreError::FeedbackClosed {
                    task_id: task_id.to_string(),
                    status: task.status,
                });
            }
            let definition = self.definition(&task.task_type)?;
            let candidates: Vec<Candidate> = self
                .store
                .users()?
                .into_iter()
                .map(|u| Candidate::new(u.id, u.scores.authority))
                .collect();
            let already: BTreeSet<UserId> = self
                .store
                .assignments(task_id)?
                .into_iter()
                .map(|a| a.user_id)
                .collect();

            let assignments =
                snapshot
                    .advocate
                    .assign(task_id, &definition, &candidates, &already, rng);
            for assignment in &assignments {
                self.store.insert_assignment(assignment.clone())?;
            }
            Ok(assignments)
        })
    }

    pub fn assignments(&self, task_id: &str) -> Result<Vec<AdvocateAssignment>> {
        self.store.assignments(task_id)
    }

    /// Scores an advocate's submission and stores the score on the
    /// assignment.
    pub fn score_advocate(&self, task_id: &str, user_id: &str) -> Result<EffectivenessReport> {
        let snapshot = self.config.current();
        if !self
            .store
            .assignments(task_id)?
            .iter()
            .any(|a| a.user_id == user_id)
        {
            return Err(CoreError::not_found(
                "advocate assignment",
                format!("{}/{}", task_id, user_id),
            ));
        }
        let task = self.store.task(task_id)?;
        let definition = self.definition(&task.task_type)?;
        let feedback = self.store.feedback_for(task_id)?;
        let submission = canonical_order(&feedback)
            .into_iter()
            .find(|f| f.submitter_id == user_id)
            .ok_or_else(|| {
                CoreError::not_found("advocate feedback", format!("{}/{}", task_id, user_id))
            })?;

        let report = snapshot
            .advocate
            .score_effectiveness(&definition, submission, &feedback);
        self.store.set_effectiveness(task_id, user_id, report.score)?;
        info!(
            task_id,
            user_id,
            score = report.score,
            calibration_delta = report.calibration_delta,
            "advocate scored"
        );
        Ok(report)
    }
}

impl<S: ScoreStore + 'static> ConsensusEngine<S> {
    /// [`process_task`](Self::process_task) on tokio's blocking pool.
    pub async fn process_task_async(self: Arc<Self>, task_id: impl Into<String>) -> Result<ProcessReport> {
        let task_id = task_id.into();
        tokio::task::spawn_blocking(move || self.process_task(&task_id))
            .await
            .map_err(|e| CoreError::Internal(format!("aggregation worker failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_scoring::CredentialType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::in_memory(EngineConfig::default()).unwrap()
    }

    fn open_task(engine: &ConsensusEngine, id: &str) {
        engine
            .create_task(id, "classification", &json!({"item": "Win a free cruise", "true_label": "spam"}))
            .unwrap();
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();
        assert_eq!(engine.config_version(), 1);
        assert!(engine.task_types().contains(&"classification".to_string()));
    }

    #[test]
    fn test_register_user_scores_credentials() {
        let engine = engine();
        let user = engine
            .register_user(
                "alice",
                vec![Credential::verified(CredentialType::AcademicDegree, "phd")],
                Default::default(),
            )
            .unwrap();
        assert!((user.scores.baseline - 0.5).abs() < 1e-12);
        assert_eq!(user.scores.track_record, INITIAL_TRACK_RECORD);
        // 0.4 * 0.5 + 0.4 * 0.5 + 0.2 * 0.5
        assert!((user.scores.authority - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_first_feedback_starts_blind_evaluation() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        assert_eq!(engine.task("t1").unwrap().status, TaskStatus::BlindEvaluation);
    }

    #[test]
    fn test_feedback_schema_enforced() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        let err = engine
            .capture_feedback("t1", "alice", json!({"reasoning": "no label"}))
            .unwrap_err();
        assert!(matches!(err, CoreError::Registry(_)));
        assert!(engine.feedback("t1").unwrap().is_empty());
        assert_eq!(engine.task("t1").unwrap().status, TaskStatus::Open);
    }

    #[test]
    fn test_resubmission_rejected() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        assert!(matches!(
            engine.capture_feedback("t1", "alice", json!({"label": "ham"})),
            Err(CoreError::DuplicateFeedback { .. })
        ));
        let stored = engine.feedback("t1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload, json!({"label": "spam"}));
    }

    #[test]
    fn test_feedback_from_unknown_user_rejected() {
        let engine = engine();
        open_task(&engine, "t1");
        assert!(matches!(
            engine.capture_feedback("t1", "ghost", json!({"label": "spam"})),
            Err(CoreError::NotFound { kind: "user", .. })
        ));
    }

    #[test]
    fn test_empty_task_persists_nothing() {
        let engine = engine();
        open_task(&engine, "t1");
        let err = engine.process_task("t1").unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(engine.results("t1").unwrap().is_empty());
        assert!(engine.bias_reports("t1").unwrap().is_empty());
        assert_eq!(engine.task("t1").unwrap().status, TaskStatus::Open);
    }

    #[test]
    fn test_process_updates_scores_once_per_user() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();

        let report = engine.process_task("t1").unwrap();
        assert_eq!(report.record.revision, 1);
        assert_eq!(report.updates.len(), 1);
        let update = &report.updates[0];
        assert_eq!(update.quality, 1.0);
        // 0.95 * 0.5 + 0.05 * 1.0
        assert!((update.current.track_record - 0.525).abs() < 1e-12);
        assert_eq!(engine.user("alice").unwrap().scores, update.current);
        assert_eq!(engine.task("t1").unwrap().status, TaskStatus::Aggregated);
    }

    #[test]
    fn test_second_process_is_invalid_transition() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        engine.process_task("t1").unwrap();
        assert!(matches!(
            engine.process_task("t1"),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(engine.results("t1").unwrap().len(), 1);
    }

    #[test]
    fn test_feedback_rejected_after_aggregation() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        engine.process_task("t1").unwrap();
        assert!(matches!(
            engine.capture_feedback("t1", "alice", json!({"label": "ham"})),
            Err(CoreError::FeedbackClosed { .. })
        ));
    }

    #[test]
    fn test_in_flight_task_rejects_process() {
        let engine = engine();
        open_task(&engine, "t1");
        let _held = engine.in_flight.try_acquire("t1").unwrap();
        assert!(matches!(
            engine.process_task("t1"),
            Err(CoreError::AggregationInProgress(_))
        ));
    }

    #[test]
    fn test_reaggregate_requires_aggregated_task() {
        let engine = engine();
        open_task(&engine, "t1");
        assert!(matches!(
            engine.reaggregate("t1"),
            Err(CoreError::NotAggregated { .. })
        ));
    }

    #[test]
    fn test_advocates_need_open_task() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        engine.process_task("t1").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            engine.assign_advocates("t1", &mut rng),
            Err(CoreError::FeedbackClosed { .. })
        ));
    }

    #[test]
    fn test_score_advocate_requires_assignment() {
        let engine = engine();
        engine.register_user("alice", Vec::new(), Default::default()).unwrap();
        open_task(&engine, "t1");
        engine.capture_feedback("t1", "alice", json!({"label": "spam"})).unwrap();
        assert!(matches!(
            engine.score_advocate("t1", "alice"),
            Err(CoreError::NotFound { kind: "advocate assignment", .. })
        ));
    }
}
