//! Authority-weighted consensus aggregation.
//!
//! Clusters feedback into positions with the task type's equality rule,
//! weights each position by the authority snapshots of its members, and
//! measures how split the evaluators are with normalized Shannon entropy:
//!
//! ```text
//! ρ(p) = Σ authority(f ∈ p) / Σ authority(f)
//! δ    = -(1 / ln|P|) · Σ ρ(p)·ln ρ(p)          δ = 0 when |P| = 1
//!
//! δ ≤ τ          CONSENSUS    primary only, confidence = ρ(primary)
//! δ > τ          UNCERTAINTY  primary + alternatives with ρ > min support
//! δ > τ_discuss  also flag the task for structured discussion
//! ```
//!
//! Aggregation is a pure function of the feedback *set*: input is put in
//! canonical order first, and every tie is broken deterministically, so
//! aggregating the same set twice yields identical results.

use std::collections::BTreeMap;

use concord_registry::canonicalize::fingerprint;
use concord_registry::{Hash, PositionKey, TaskTypeDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CouncilError, Result};
use crate::feedback::{canonical_order, Feedback, TaskId, UserId};

/// Upper bound of an authority snapshot.
const MAX_AUTHORITY: f64 = 2.0;

/// Thresholds for the consensus/uncertainty branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// τ: above this, alternatives are preserved.
    pub disagreement_threshold: f64,
    /// Above this, the task needs structured discussion.
    pub discussion_threshold: f64,
    /// Alternatives need support strictly above this.
    pub min_alternative_support: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            disagreement_threshold: 0.4,
            discussion_threshold: 0.6,
            min_alternative_support: 0.1,
        }
    }
}

impl AggregatorConfig {
    pub fn with_disagreement_threshold(mut self, threshold: f64) -> Self {
        self.disagreement_threshold = threshold;
        self
    }

    pub fn with_discussion_threshold(mut self, threshold: f64) -> Self {
        self.discussion_threshold = threshold;
        self
    }

    pub fn with_min_alternative_support(mut self, support: f64) -> Self {
        self.min_alternative_support = support;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("disagreement_threshold", self.disagreement_threshold),
            ("discussion_threshold", self.discussion_threshold),
            ("min_alternative_support", self.min_alternative_support),
        ] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(CouncilError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.discussion_threshold < self.disagreement_threshold {
            return Err(CouncilError::InvalidConfig(format!(
                "discussion_threshold ({}) must not be below disagreement_threshold ({})",
                self.discussion_threshold, self.disagreement_threshold
            )));
        }
        Ok(())
    }
}

/// A non-primary position preserved in uncertainty mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePosition {
    pub position: Value,
    /// ρ of this position.
    pub support: f64,
    pub reasoning: Option<String>,
    /// Absolute authority mass behind the position.
    pub authority_weight: f64,
}

/// Immutable outcome of aggregating one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub task_id: TaskId,
    pub primary_answer: Value,
    pub confidence_level: f64,
    pub disagreement_score: f64,
    pub uncertainty_preserved: bool,
    pub alternative_positions: Vec<AlternativePosition>,
}

impl AggregationResult {
    /// SHA-256 over the canonical JSON of this result.
    pub fn fingerprint(&self) -> Result<Hash> {
        Ok(fingerprint(self)?)
    }

    pub fn is_consensus(&self) -> bool {
        !self.uncertainty_preserved
    }
}

/// One clustered position, as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub key: PositionKey,
    /// Position-defining part of the representative payload.
    pub position: Value,
    pub support: f64,
    pub authority_weight: f64,
    pub members: usize,
    pub reasoning: Option<String>,
}

/// Per-feedback quality signal for the track-record update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyScore {
    pub feedback_id: Uuid,
    pub submitter_id: UserId,
    /// `None` for feedback whose position could not be derived.
    pub position: Option<PositionKey>,
    pub quality: f64,
}

/// Everything one aggregation run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub result: AggregationResult,
    pub primary_position: PositionKey,
    pub needs_discussion: bool,
    /// All positions, primary first.
    pub positions: Vec<PositionSummary>,
    /// One entry per input feedback, in canonical order.
    pub consistency: Vec<ConsistencyScore>,
    /// Feedback left out of clustering.
    pub excluded: Vec<Uuid>,
    /// Authority snapshots summed to zero; every member counted as 1.
    pub unit_weight_fallback: bool,
}

/// Normalized Shannon entropy of a weight distribution, in `[0, 1]`.
///
/// Weights need not sum to one. Zero weights are ignored; with fewer than
/// two positive weights the entropy is 0.
pub fn normalized_entropy(weights: &[f64]) -> f64 {
    let positive: Vec<f64> = weights
        .iter()
        .copied()
        .filter(|w| w.is_finite() && *w > 0.0)
        .collect();
    if positive.len() < 2 {
        return 0.0;
    }
    let total: f64 = positive.iter().sum();
    let h: f64 = positive
        .iter()
        .map(|w| {
            let p = w / total;
            -p * p.ln()
        })
        .sum();
    (h / (positive.len() as f64).ln()).clamp(0.0, 1.0)
}

struct Member<'a> {
    feedback: &'a Feedback,
    weight: f64,
}

struct Cluster<'a> {
    mass: f64,
    members: Vec<Member<'a>>,
}

struct Clustering<'a> {
    ordered: Vec<&'a Feedback>,
    keys: Vec<Option<PositionKey>>,
    clusters: BTreeMap<PositionKey, Cluster<'a>>,
    total: f64,
    unit_weight_fallback: bool,
}

impl<'a> Clustering<'a> {
    fn build(definition: &TaskTypeDefinition, feedback: &'a [Feedback]) -> Self {
        let ordered = canonical_order(feedback);
        let keys: Vec<Option<PositionKey>> = ordered
            .iter()
            .map(|f| definition.position_key(&f.payload))
            .collect();

        let weights: Vec<f64> = ordered
            .iter()
            .map(|f| {
                if f.authority_snapshot.is_finite() {
                    f.authority_snapshot.clamp(0.0, MAX_AUTHORITY)
                } else {
                    warn!(feedback = %f.id, "non-finite authority snapshot, using 0");
                    0.0
                }
            })
            .collect();
        let clustered_mass: f64 = weights
            .iter()
            .zip(&keys)
            .filter(|(_, k)| k.is_some())
            .map(|(w, _)| w)
            .sum();
        let unit_weight_fallback = clustered_mass <= 0.0;

        let mut clusters: BTreeMap<PositionKey, Cluster<'a>> = BTreeMap::new();
        let mut total = 0.0;
        for ((&f, key), &snapshot) in ordered.iter().zip(&keys).zip(&weights) {
            let Some(key) = key else {
                warn!(
                    feedback = %f.id,
                    task_type = %definition.tag,
                    "feedback has no derivable position, excluded from clustering"
                );
                continue;
            };
            let weight = if unit_weight_fallback { 1.0 } else { snapshot };
            let cluster = clusters.entry(key.clone()).or_insert_with(|| Cluster {
                mass: 0.0,
                members: Vec::new(),
            });
            cluster.mass += weight;
            cluster.members.push(Member { feedback: f, weight });
            total += weight;
        }

        Self {
            ordered,
            keys,
            clusters,
            total,
            unit_weight_fallback,
        }
    }

    fn disagreement(&self) -> f64 {
        let masses: Vec<f64> = self.clusters.values().map(|c| c.mass).collect();
        normalized_entropy(&masses)
    }
}

/// Disagreement δ of a feedback set, or `None` when no feedback has a
/// derivable position.
pub fn disagreement_of(definition: &TaskTypeDefinition, feedback: &[Feedback]) -> Option<f64> {
    let clustering = Clustering::build(definition, feedback);
    if clustering.clusters.is_empty() {
        None
    } else {
        Some(clustering.disagreement())
    }
}

/// Consensus aggregator.
#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    config: AggregatorConfig,
}

impl ConsensusAggregator {
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Aggregates one task's feedback.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InsufficientData`] when `feedback` is empty or no item
    /// has a derivable position.
    pub fn aggregate(
        &self,
        task_id: &str,
        definition: &TaskTypeDefinition,
        feedback: &[Feedback],
    ) -> Result<AggregationOutcome> {
        if feedback.is_empty() {
            return Err(CouncilError::insufficient(task_id, "no feedback submitted"));
        }
        let clustering = Clustering::build(definition, feedback);
        if clustering.clusters.is_empty() {
            return Err(CouncilError::insufficient(
                task_id,
                "no feedback with a derivable position",
            ));
        }
        if clustering.unit_weight_fallback {
            warn!(task_id, "total authority is zero, falling back to unit weights");
        }

        let delta = clustering.disagreement();
        let positions = self.summarize(definition, &clustering);
        let Some(primary) = positions.first().cloned() else {
            return Err(CouncilError::insufficient(task_id, "no positions"));
        };

        let uncertain = delta > self.config.disagreement_threshold;
        let needs_discussion = delta > self.config.discussion_threshold;
        let alternatives: Vec<&PositionSummary> = if uncertain {
            positions[1..]
                .iter()
                .filter(|p| p.support > self.config.min_alternative_support)
                .collect()
        } else {
            Vec::new()
        };

        let consistency = score_consistency(definition, &clustering, &primary, &alternatives);
        let excluded = clustering
            .ordered
            .iter()
            .zip(&clustering.keys)
            .filter(|(_, k)| k.is_none())
            .map(|(f, _)| f.id)
            .collect();

        let result = AggregationResult {
            task_id: task_id.to_string(),
            primary_answer: primary.position.clone(),
            confidence_level: primary.support,
            disagreement_score: delta,
            uncertainty_preserved: uncertain,
            alternative_positions: alternatives
                .iter()
                .map(|p| AlternativePosition {
                    position: p.position.clone(),
                    support: p.support,
                    reasoning: p.reasoning.clone(),
                    authority_weight: p.authority_weight,
                })
                .collect(),
        };

        info!(
            task_id,
            task_type = %definition.tag,
            positions = positions.len(),
            disagreement = delta,
            confidence = primary.support,
            uncertainty_preserved = uncertain,
            needs_discussion,
            "aggregated feedback"
        );

        Ok(AggregationOutcome {
            result,
            primary_position: primary.key,
            needs_discussion,
            positions,
            consistency,
            excluded,
            unit_weight_fallback: clustering.unit_weight_fallback,
        })
    }

    /// Position summaries, primary first: higher ρ, then more members, then
    /// the smaller key.
    fn summarize(
        &self,
        definition: &TaskTypeDefinition,
        clustering: &Clustering<'_>,
    ) -> Vec<PositionSummary> {
        let mut positions: Vec<PositionSummary> = clustering
            .clusters
            .iter()
            .map(|(key, cluster)| {
                // Members are in canonical order, so strict `>` keeps the
                // earliest submission on weight ties.
                let mut representative = &cluster.members[0];
                let mut reasoning: Option<(f64, &str)> = None;
                for member in &cluster.members {
                    if member.weight > representative.weight {
                        representative = member;
                    }
                    if let Some(text) = definition.reasoning(&member.feedback.payload) {
                        if reasoning.map_or(true, |(w, _)| member.weight > w) {
                            reasoning = Some((member.weight, text));
                        }
                    }
                }
                PositionSummary {
                    key: key.clone(),
                    position: definition.position_view(&representative.feedback.payload),
                    support: cluster.mass / clustering.total,
                    authority_weight: cluster.mass,
                    members: cluster.members.len(),
                    reasoning: reasoning.map(|(_, text)| text.to_string()),
                }
            })
            .collect();

        positions.sort_by(|a, b| {
            b.support
                .total_cmp(&a.support)
                .then_with(|| b.members.cmp(&a.members))
                .then_with(|| a.key.cmp(&b.key))
        });
        debug!(
            positions = ?positions.iter().map(|p| (p.key.as_str(), p.support)).collect::<Vec<_>>(),
            "clustered positions"
        );
        positions
    }
}

/// `quality(f) = max_e sim(f, e) · credit(e)` over the emitted positions,
/// where the primary has credit 1 and an alternative `ρ(alt) / ρ(primary)`.
fn score_consistency(
    definition: &TaskTypeDefinition,
    clustering: &Clustering<'_>,
    primary: &PositionSummary,
    alternatives: &[&PositionSummary],
) -> Vec<ConsistencyScore> {
    let mut emitted: Vec<(&Value, f64)> = vec![(&primary.position, 1.0)];
    if primary.support > 0.0 {
        emitted.extend(
            alternatives
                .iter()
                .map(|p| (&p.position, (p.support / primary.support).min(1.0))),
        );
    }

    clustering
        .ordered
        .iter()
        .zip(&clustering.keys)
        .map(|(f, key)| {
            let quality = emitted
                .iter()
                .map(|(position, credit)| definition.consistency(&f.payload, position) * credit)
                .fold(0.0, f64::max)
                .clamp(0.0, 1.0);
            ConsistencyScore {
                feedback_id: f.id,
                submitter_id: f.submitter_id.clone(),
                position: key.clone(),
                quality,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_registry::TaskTypeRegistry;
    use serde_json::json;

    fn classification() -> std::sync::Arc<TaskTypeDefinition> {
        TaskTypeRegistry::with_builtins().get("classification").unwrap()
    }

    fn fb(user: &str, authority: f64, label: &str) -> Feedback {
        Feedback::new("t", user, authority, json!({"label": label}))
    }

    // =========================================================================
    // Entropy
    // =========================================================================

    #[test]
    fn test_entropy_reference_values() {
        assert!((normalized_entropy(&[0.7, 0.3]) - 0.881).abs() < 1e-3);
        assert!((normalized_entropy(&[0.95, 0.05]) - 0.286).abs() < 1e-3);
        assert!((normalized_entropy(&[1.0, 1.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_entropy_degenerate() {
        assert_eq!(normalized_entropy(&[]), 0.0);
        assert_eq!(normalized_entropy(&[3.0]), 0.0);
        assert_eq!(normalized_entropy(&[3.0, 0.0]), 0.0);
    }

    #[test]
    fn test_entropy_is_scale_invariant() {
        let a = normalized_entropy(&[0.7, 0.3]);
        let b = normalized_entropy(&[1.4, 0.6]);
        assert!((a - b).abs() < 1e-12);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    #[test]
    fn test_config_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());
        assert!(AggregatorConfig::default()
            .with_disagreement_threshold(1.2)
            .validate()
            .is_err());
        assert!(AggregatorConfig::default()
            .with_discussion_threshold(0.3)
            .validate()
            .is_err());
        assert!(ConsensusAggregator::new(
            AggregatorConfig::default().with_min_alternative_support(f64::NAN)
        )
        .is_err());
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    #[test]
    fn test_empty_feedback_is_insufficient() {
        let agg = ConsensusAggregator::default();
        assert!(matches!(
            agg.aggregate("t", &classification(), &[]),
            Err(CouncilError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_unclusterable_feedback_is_insufficient() {
        let agg = ConsensusAggregator::default();
        let only = Feedback::new("t", "u", 1.0, json!({"reasoning": "no label"}));
        assert!(matches!(
            agg.aggregate("t", &classification(), &[only]),
            Err(CouncilError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_single_feedback_is_trivial_consensus() {
        let agg = ConsensusAggregator::default();
        let out = agg.aggregate("t", &classification(), &[fb("u", 0.8, "spam")]).unwrap();
        assert_eq!(out.result.disagreement_score, 0.0);
        assert_eq!(out.result.confidence_level, 1.0);
        assert!(!out.result.uncertainty_preserved);
        assert_eq!(out.result.primary_answer, json!({"label": "spam"}));
        assert_eq!(out.consistency[0].quality, 1.0);
    }

    #[test]
    fn test_uncertainty_mode() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 1.4, "spam"), fb("b", 0.6, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert!((out.result.disagreement_score - 0.881).abs() < 1e-3);
        assert!(out.result.uncertainty_preserved);
        assert!(out.needs_discussion);
        assert!((out.result.confidence_level - 0.7).abs() < 1e-12);
        assert_eq!(out.result.alternative_positions.len(), 1);
        let alt = &out.result.alternative_positions[0];
        assert_eq!(alt.position, json!({"label": "ham"}));
        assert!((alt.support - 0.3).abs() < 1e-12);
        assert!((alt.authority_weight - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_consensus_mode() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 1.9, "spam"), fb("b", 0.1, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert!((out.result.disagreement_score - 0.286).abs() < 1e-3);
        assert!(out.result.is_consensus());
        assert!(!out.needs_discussion);
        assert!((out.result.confidence_level - 0.95).abs() < 1e-12);
        assert!(out.result.alternative_positions.is_empty());
    }

    #[test]
    fn test_min_support_filters_alternatives() {
        let agg = ConsensusAggregator::default();
        // ρ = 0.45, 0.45, 0.1: the last is not strictly above 0.1.
        let set = vec![fb("a", 0.9, "spam"), fb("b", 0.9, "ham"), fb("c", 0.2, "phish")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert!(out.result.uncertainty_preserved);
        assert_eq!(out.result.alternative_positions.len(), 1);
        assert_eq!(out.positions.len(), 3);
    }

    #[test]
    fn test_tie_break_prefers_more_members_then_key() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 1.0, "spam"), fb("b", 0.5, "ham"), fb("c", 0.5, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert_eq!(out.primary_position.as_str(), "ham");

        let set = vec![fb("a", 1.0, "spam"), fb("b", 1.0, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert_eq!(out.primary_position.as_str(), "ham");
    }

    #[test]
    fn test_zero_authority_falls_back_to_unit_weights() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 0.0, "spam"), fb("b", 0.0, "spam"), fb("c", 0.0, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert!(out.unit_weight_fallback);
        assert!((out.result.confidence_level - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_excluded_feedback_scores_zero() {
        let agg = ConsensusAggregator::default();
        let bad = Feedback::new("t", "x", 1.0, json!({"reasoning": "forgot the label"}));
        let set = vec![fb("a", 1.0, "spam"), bad.clone()];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert_eq!(out.excluded, vec![bad.id]);
        let score = out.consistency.iter().find(|c| c.feedback_id == bad.id).unwrap();
        assert_eq!(score.quality, 0.0);
        assert!(score.position.is_none());
    }

    #[test]
    fn test_alternative_members_get_partial_credit() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 1.4, "spam"), fb("b", 0.6, "ham")];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        let q = |user: &str| {
            out.consistency
                .iter()
                .find(|c| c.submitter_id == user)
                .unwrap()
                .quality
        };
        assert_eq!(q("a"), 1.0);
        assert!((q("b") - 0.3 / 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_representative_reasoning_from_highest_authority() {
        let agg = ConsensusAggregator::default();
        let set = vec![
            Feedback::new("t", "a", 0.5, json!({"label": "spam", "reasoning": "weak"})),
            Feedback::new("t", "b", 1.5, json!({"label": "spam", "reasoning": "strong"})),
            Feedback::new("t", "c", 1.0, json!({"label": "ham", "reasoning": "maybe"})),
        ];
        let out = agg.aggregate("t", &classification(), &set).unwrap();
        assert_eq!(out.positions[0].reasoning.as_deref(), Some("strong"));
        assert_eq!(out.positions[1].reasoning.as_deref(), Some("maybe"));
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let agg = ConsensusAggregator::default();
        let set = vec![fb("a", 1.1, "spam"), fb("b", 0.7, "ham"), fb("c", 0.3, "phish")];
        let mut reversed = set.clone();
        reversed.reverse();
        let first = agg.aggregate("t", &classification(), &set).unwrap();
        let second = agg.aggregate("t", &classification(), &reversed).unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(
            first.result.fingerprint().unwrap(),
            second.result.fingerprint().unwrap()
        );
    }

    #[test]
    fn test_disagreement_of() {
        let def = classification();
        assert_eq!(disagreement_of(&def, &[]), None);
        let set = vec![fb("a", 0.7, "spam"), fb("b", 0.3, "ham")];
        assert!((disagreement_of(&def, &set).unwrap() - 0.881).abs() < 1e-3);
    }
}
