//! Devil's-advocate assignment and effectiveness scoring.
//!
//! # Assignment
//!
//! ```text
//! E = { users with authority > floor } \ already assigned
//! P = min(p_max, target / |E|)          (default p_max = 0.1, target = 3)
//! ```
//!
//! Every eligible evaluator is drawn independently with probability `P`
//! from a caller-supplied random source. The pool is deduplicated and sorted
//! by user id before drawing, so a seeded RNG over the same pool always
//! yields the same assignments.
//!
//! # Effectiveness
//!
//! ```text
//! score = 0.4·diversity + 0.3·engagement + 0.3·min(1, |δ(all) − δ(all \ advocate)|)
//! ```
//!
//! - **diversity**: 1 if the advocate's position was held by no earlier
//!   submission, else 0
//! - **engagement**: ½·min(1, words/100) + ½·min(1, markers/3) over the
//!   advocate's reasoning, where markers are critical-thinking phrases
//! - **calibration**: how much the advocate's submission moved δ

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use concord_registry::TaskTypeDefinition;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consensus::disagreement_of;
use crate::error::{CouncilError, Result};
use crate::feedback::{canonical_order, Feedback, TaskId, UserId};

/// Words of reasoning that earn full length credit.
const FULL_CREDIT_WORDS: f64 = 100.0;

/// Critical markers that earn full marker credit.
const FULL_CREDIT_MARKERS: f64 = 3.0;

/// Mixing weights for the effectiveness score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectivenessWeights {
    pub diversity: f64,
    pub engagement: f64,
    pub calibration: f64,
}

impl Default for EffectivenessWeights {
    fn default() -> Self {
        Self {
            diversity: 0.4,
            engagement: 0.3,
            calibration: 0.3,
        }
    }
}

/// Devil's-advocate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvocateConfig {
    /// Users need authority strictly above this to be eligible.
    pub eligibility_floor: f64,
    /// Cap on the per-user assignment probability.
    pub max_probability: f64,
    /// Expected number of advocates per task for large pools.
    pub target_count: f64,
    pub weights: EffectivenessWeights,
    /// Phrases counted as critical markers (case-insensitive, whole words).
    pub critical_markers: Vec<String>,
}

impl Default for AdvocateConfig {
    fn default() -> Self {
        Self {
            eligibility_floor: 0.5,
            max_probability: 0.1,
            target_count: 3.0,
            weights: EffectivenessWeights::default(),
            critical_markers: [
                "however",
                "but",
                "although",
                "on the other hand",
                "counterexample",
                "assumes",
                "assumption",
                "overlooks",
                "alternatively",
                "weakness",
                "flaw",
                "risk",
                "unless",
                "what if",
                "evidence",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl AdvocateConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CouncilError::InvalidConfig(msg));
        if !self.eligibility_floor.is_finite() || !(0.0..=2.0).contains(&self.eligibility_floor) {
            return invalid(format!(
                "eligibility_floor must be in [0, 2], got {}",
                self.eligibility_floor
            ));
        }
        if !self.max_probability.is_finite() || !(0.0..=1.0).contains(&self.max_probability) {
            return invalid(format!(
                "max_probability must be in [0, 1], got {}",
                self.max_probability
            ));
        }
        if !self.target_count.is_finite() || self.target_count < 0.0 {
            return invalid(format!(
                "target_count must be finite and >= 0, got {}",
                self.target_count
            ));
        }
        let w = &self.weights;
        let parts = [w.diversity, w.engagement, w.calibration];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return invalid("effectiveness weights must be finite and >= 0".to_string());
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return invalid(format!("effectiveness weights must sum to 1, got {}", sum));
        }
        Ok(())
    }
}

/// `min(max_probability, target / eligible)`; 0 for an empty pool.
pub fn assignment_probability(config: &AdvocateConfig, eligible: usize) -> f64 {
    if eligible == 0 {
        return 0.0;
    }
    (config.target_count / eligible as f64).min(config.max_probability)
}

/// A potential advocate and their current authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub user_id: UserId,
    pub authority: f64,
}

impl Candidate {
    pub fn new(user_id: impl Into<UserId>, authority: f64) -> Self {
        Self {
            user_id: user_id.into(),
            authority,
        }
    }
}

/// One devil's-advocate assignment. Unique per (task, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvocateAssignment {
    pub task_id: TaskId,
    pub user_id: UserId,
    /// Probability the user was drawn with.
    pub probability: f64,
    pub instructions: Vec<String>,
    /// Filled in after the advocate's feedback is scored.
    pub effectiveness_score: Option<f64>,
    pub assigned_at: DateTime<Utc>,
}

/// Breakdown of one advocate's effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessReport {
    pub diversity: f64,
    pub engagement: f64,
    /// Signed change in δ caused by the advocate's submission.
    pub calibration_delta: f64,
    pub score: f64,
}

/// Draws advocates and scores their contributions.
#[derive(Debug, Clone)]
pub struct AdvocateAssigner {
    config: AdvocateConfig,
    markers: Option<Regex>,
}

impl AdvocateAssigner {
    /// # Errors
    ///
    /// [`CouncilError::InvalidConfig`] if the configuration is out of range
    /// or the marker list does not compile.
    pub fn new(config: AdvocateConfig) -> Result<Self> {
        config.validate()?;
        let phrases: Vec<String> = config
            .critical_markers
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(|m| regex::escape(m).replace(' ', r"\s+"))
            .collect();
        let markers = if phrases.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", phrases.join("|"));
            Some(Regex::new(&pattern).map_err(|e| {
                CouncilError::InvalidConfig(format!("critical markers do not compile: {}", e))
            })?)
        };
        Ok(Self { config, markers })
    }

    pub fn config(&self) -> &AdvocateConfig {
        &self.config
    }

    /// Eligible pool: authority strictly above the floor, not yet assigned,
    /// deduplicated and sorted by user id.
    pub fn eligible_pool(
        &self,
        candidates: &[Candidate],
        already_assigned: &BTreeSet<UserId>,
    ) -> Vec<UserId> {
        let pool: BTreeSet<&UserId> = candidates
            .iter()
            .filter(|c| c.authority.is_finite() && c.authority > self.config.eligibility_floor)
            .map(|c| &c.user_id)
            .filter(|u| !already_assigned.contains(*u))
            .collect();
        pool.into_iter().cloned().collect()
    }

    /// Draws advocates for a task.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        task_id: &str,
        definition: &TaskTypeDefinition,
        candidates: &[Candidate],
        already_assigned: &BTreeSet<UserId>,
        rng: &mut R,
    ) -> Vec<AdvocateAssignment> {
        let pool = self.eligible_pool(candidates, already_assigned);
        let probability = assignment_probability(&self.config, pool.len());
        debug!(task_id, eligible = pool.len(), probability, "drawing advocates");

        let now = Utc::now();
        let assignments: Vec<AdvocateAssignment> = pool
            .into_iter()
            .filter(|_| rng.gen_bool(probability))
            .map(|user_id| AdvocateAssignment {
                task_id: task_id.to_string(),
                user_id,
                probability,
                instructions: definition.critical_prompts.clone(),
                effectiveness_score: None,
                assigned_at: now,
            })
            .collect();

        info!(
            task_id,
            assigned = assignments.len(),
            probability,
            "devil's advocates assigned"
        );
        assignments
    }

    /// Engagement of a piece of reasoning, in `[0, 1]`.
    pub fn engagement(&self, reasoning: &str) -> f64 {
        let words = reasoning.split_whitespace().count() as f64;
        let markers = self
            .markers
            .as_ref()
            .map_or(0, |re| re.find_iter(reasoning).count()) as f64;
        0.5 * (words / FULL_CREDIT_WORDS).min(1.0) + 0.5 * (markers / FULL_CREDIT_MARKERS).min(1.0)
    }

    /// Scores one advocate submission against the task's full feedback set.
    ///
    /// `all_feedback` should include `advocate`; it is matched by id.
    pub fn score_effectiveness(
        &self,
        definition: &TaskTypeDefinition,
        advocate: &Feedback,
        all_feedback: &[Feedback],
    ) -> EffectivenessReport {
        let own = definition.position_key(&advocate.payload);
        let earlier_positions: BTreeSet<_> = canonical_order(all_feedback)
            .into_iter()
            .take_while(|f| f.id != advocate.id)
            .filter_map(|f| definition.position_key(&f.payload))
            .collect();
        let diversity = match &own {
            Some(key) if !earlier_positions.contains(key) => 1.0,
            _ => 0.0,
        };

        let engagement = definition
            .reasoning(&advocate.payload)
            .map_or(0.0, |r| self.engagement(r));

        let mut with: Vec<Feedback> = all_feedback.to_vec();
        if !with.iter().any(|f| f.id == advocate.id) {
            with.push(advocate.clone());
        }
        let without: Vec<Feedback> = with
            .iter()
            .filter(|f| f.id != advocate.id)
            .cloned()
            .collect();
        let delta_with = disagreement_of(definition, &with).unwrap_or(0.0);
        let delta_without = disagreement_of(definition, &without).unwrap_or(0.0);
        let calibration_delta = delta_with - delta_without;

        let w = &self.config.weights;
        let score = (w.diversity * diversity
            + w.engagement * engagement
            + w.calibration * calibration_delta.abs().min(1.0))
        .clamp(0.0, 1.0);

        debug!(
            feedback = %advocate.id,
            diversity,
            engagement,
            calibration_delta,
            score,
            "scored advocate"
        );
        EffectivenessReport {
            diversity,
            engagement,
            calibration_delta,
            score,
        }
    }
}
