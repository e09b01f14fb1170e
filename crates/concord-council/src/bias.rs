//! Six-dimensional bias analysis over one task's feedback.
//!
//! The report is advisory. It runs after aggregation over the same feedback
//! set and never feeds back into the aggregation result.
//!
//! # Dimensions
//!
//! | Dimension | Measure | Needs |
//! |-----------|---------|-------|
//! | Demographic correlation | Cramér's V of group × position | ≥ 2 groups and positions |
//! | Professional clustering | 1 − normalized entropy of professions | ≥ 2 known |
//! | Temporal drift | TVD between early and late position distributions | ≥ 4 items |
//! | Geographic concentration | 1 − normalized entropy of regions | ≥ 2 known |
//! | Confirmation bias | mean share of prior positions equal to the current one | any history |
//! | Anchoring bias | abs Pearson of submission rank vs. "agrees with the first" | ≥ 3 items |
//!
//! A dimension without enough data scores 0. The total is the Euclidean
//! norm of the six scores, so it lies in `[0, √6]`.
//!
//! ## References
//!
//! - Cramér, H. (1946). *Mathematical Methods of Statistics*, §21.9
//! - Tversky, A. & Kahneman, D. (1974). "Judgment under Uncertainty:
//!   Heuristics and Biases" *Science*, 185(4157), 1124-1131.

use std::collections::BTreeMap;
use std::fmt;

use concord_registry::{PositionKey, TaskTypeDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consensus::normalized_entropy;
use crate::error::{CouncilError, Result};
use crate::feedback::{canonical_order, Feedback, TaskId};

/// One of the six bias dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasDimension {
    DemographicCorrelation,
    ProfessionalClustering,
    TemporalDrift,
    GeographicConcentration,
    ConfirmationBias,
    AnchoringBias,
}

impl BiasDimension {
    pub const ALL: [BiasDimension; 6] = [
        BiasDimension::DemographicCorrelation,
        BiasDimension::ProfessionalClustering,
        BiasDimension::TemporalDrift,
        BiasDimension::GeographicConcentration,
        BiasDimension::ConfirmationBias,
        BiasDimension::AnchoringBias,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BiasDimension::DemographicCorrelation => "demographic_correlation",
            BiasDimension::ProfessionalClustering => "professional_clustering",
            BiasDimension::TemporalDrift => "temporal_drift",
            BiasDimension::GeographicConcentration => "geographic_concentration",
            BiasDimension::ConfirmationBias => "confirmation_bias",
            BiasDimension::AnchoringBias => "anchoring_bias",
        }
    }

    /// Static mitigation attached when the dimension crosses its alert
    /// threshold.
    pub fn mitigation(&self) -> &'static str {
        match self {
            BiasDimension::DemographicCorrelation => {
                "Positions split along demographic lines; recruit evaluators from under-represented groups before finalizing."
            }
            BiasDimension::ProfessionalClustering => {
                "Evaluators share a single professional background; add reviewers from adjacent disciplines."
            }
            BiasDimension::TemporalDrift => {
                "Opinion shifted between early and late submissions; check whether the task context changed mid-evaluation."
            }
            BiasDimension::GeographicConcentration => {
                "Evaluators are concentrated in one region; widen geographic recruitment."
            }
            BiasDimension::ConfirmationBias => {
                "Evaluators largely repeated their own earlier positions; rotate assignments or hide prior answers."
            }
            BiasDimension::AnchoringBias => {
                "Agreement with the first submission tracks submission order; enforce blind evaluation and randomize order."
            }
        }
    }
}

impl fmt::Display for BiasDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Overall bias classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for BiasLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiasLevel::Low => write!(f, "LOW"),
            BiasLevel::Medium => write!(f, "MEDIUM"),
            BiasLevel::High => write!(f, "HIGH"),
        }
    }
}

/// The six dimension scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasDimensions {
    pub demographic_correlation: f64,
    pub professional_clustering: f64,
    pub temporal_drift: f64,
    pub geographic_concentration: f64,
    pub confirmation_bias: f64,
    pub anchoring_bias: f64,
}

impl BiasDimensions {
    /// Every dimension set to `value`.
    pub fn uniform(value: f64) -> Self {
        Self {
            demographic_correlation: value,
            professional_clustering: value,
            temporal_drift: value,
            geographic_concentration: value,
            confirmation_bias: value,
            anchoring_bias: value,
        }
    }

    pub fn get(&self, dimension: BiasDimension) -> f64 {
        match dimension {
            BiasDimension::DemographicCorrelation => self.demographic_correlation,
            BiasDimension::ProfessionalClustering => self.professional_clustering,
            BiasDimension::TemporalDrift => self.temporal_drift,
            BiasDimension::GeographicConcentration => self.geographic_concentration,
            BiasDimension::ConfirmationBias => self.confirmation_bias,
            BiasDimension::AnchoringBias => self.anchoring_bias,
        }
    }

    /// Euclidean norm of the six-vector.
    pub fn norm(&self) -> f64 {
        BiasDimension::ALL
            .iter()
            .map(|d| self.get(*d).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Level boundaries on the total score: `≤ low` is low, `≤ medium` is
/// medium, anything above is high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasLevelThresholds {
    pub low: f64,
    pub medium: f64,
}

impl Default for BiasLevelThresholds {
    fn default() -> Self {
        Self {
            low: 0.5,
            medium: 1.0,
        }
    }
}

impl BiasLevelThresholds {
    pub fn classify(&self, total: f64) -> BiasLevel {
        if total <= self.low {
            BiasLevel::Low
        } else if total <= self.medium {
            BiasLevel::Medium
        } else {
            BiasLevel::High
        }
    }
}

/// Bias analyzer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    pub levels: BiasLevelThresholds,
    /// Per-dimension alert thresholds; alerts fire strictly above.
    pub alert_thresholds: BiasDimensions,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            levels: BiasLevelThresholds::default(),
            alert_thresholds: BiasDimensions::uniform(0.7),
        }
    }
}

impl BiasConfig {
    pub fn validate(&self) -> Result<()> {
        let BiasLevelThresholds { low, medium } = self.levels;
        if !(low.is_finite() && medium.is_finite() && 0.0 <= low && low <= medium) {
            return Err(CouncilError::InvalidConfig(format!(
                "bias level thresholds must satisfy 0 <= low <= medium, got low={} medium={}",
                low, medium
            )));
        }
        for dimension in BiasDimension::ALL {
            let t = self.alert_thresholds.get(dimension);
            if !(t.is_finite() && (0.0..=1.0).contains(&t)) {
                return Err(CouncilError::InvalidConfig(format!(
                    "alert threshold for {} must be in [0, 1], got {}",
                    dimension, t
                )));
            }
        }
        Ok(())
    }
}

/// A dimension above its alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasAlert {
    pub dimension: BiasDimension,
    pub score: f64,
    pub threshold: f64,
    pub mitigation: String,
}

/// Advisory bias report for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub task_id: TaskId,
    pub dimensions: BiasDimensions,
    pub total_bias_score: f64,
    pub level: BiasLevel,
    pub recommendations: Vec<BiasAlert>,
}

impl BiasReport {
    /// Builds the report from already computed dimension scores.
    pub fn from_dimensions(task_id: &str, dimensions: BiasDimensions, config: &BiasConfig) -> Self {
        let total_bias_score = dimensions.norm();
        let recommendations = BiasDimension::ALL
            .iter()
            .filter_map(|d| {
                let score = dimensions.get(*d);
                let threshold = config.alert_thresholds.get(*d);
                (score > threshold).then(|| BiasAlert {
                    dimension: *d,
                    score,
                    threshold,
                    mitigation: d.mitigation().to_string(),
                })
            })
            .collect();
        Self {
            task_id: task_id.to_string(),
            dimensions,
            total_bias_score,
            level: config.levels.classify(total_bias_score),
            recommendations,
        }
    }
}

/// Computes [`BiasReport`]s.
#[derive(Debug, Clone, Default)]
pub struct BiasAnalyzer {
    config: BiasConfig,
}

impl BiasAnalyzer {
    pub fn new(config: BiasConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    /// Analyzes a feedback set. Never fails; an empty set reports all zeros.
    pub fn analyze(
        &self,
        task_id: &str,
        definition: &TaskTypeDefinition,
        feedback: &[Feedback],
    ) -> BiasReport {
        let ordered = canonical_order(feedback);
        let keyed: Vec<(&Feedback, PositionKey)> = ordered
            .iter()
            .filter_map(|f| definition.position_key(&f.payload).map(|k| (*f, k)))
            .collect();

        let dimensions = BiasDimensions {
            demographic_correlation: demographic_correlation(&keyed),
            professional_clustering: concentration(
                ordered.iter().filter_map(|f| f.profile.profession.as_deref()),
            ),
            temporal_drift: temporal_drift(&keyed),
            geographic_concentration: concentration(
                ordered.iter().filter_map(|f| f.profile.region.as_deref()),
            ),
            confirmation_bias: confirmation_bias(&keyed),
            anchoring_bias: anchoring_bias(&keyed),
        };
        debug!(task_id, ?dimensions, "computed bias dimensions");

        let report = BiasReport::from_dimensions(task_id, dimensions, &self.config);
        info!(
            task_id,
            total = report.total_bias_score,
            level = %report.level,
            alerts = report.recommendations.len(),
            "bias analysis complete"
        );
        report
    }
}

// =============================================================================
// Dimension measures
// =============================================================================

/// Cramér's V between demographic group and position.
fn demographic_correlation(keyed: &[(&Feedback, PositionKey)]) -> f64 {
    let pairs: Vec<(&str, &PositionKey)> = keyed
        .iter()
        .filter_map(|(f, k)| f.profile.demographic_group.as_deref().map(|g| (g, k)))
        .collect();
    let n = pairs.len() as f64;

    let mut table: BTreeMap<(&str, &PositionKey), f64> = BTreeMap::new();
    let mut rows: BTreeMap<&str, f64> = BTreeMap::new();
    let mut cols: BTreeMap<&PositionKey, f64> = BTreeMap::new();
    for (g, k) in &pairs {
        *table.entry((*g, *k)).or_default() += 1.0;
        *rows.entry(*g).or_default() += 1.0;
        *cols.entry(*k).or_default() += 1.0;
    }
    let dof = rows.len().min(cols.len());
    if dof < 2 || n < 2.0 {
        return 0.0;
    }

    let mut chi2 = 0.0;
    for (g, row_total) in &rows {
        for (k, col_total) in &cols {
            let expected = row_total * col_total / n;
            let observed = table.get(&(*g, *k)).copied().unwrap_or(0.0);
            chi2 += (observed - expected).powi(2) / expected;
        }
    }
    (chi2 / (n * (dof - 1) as f64)).sqrt().clamp(0.0, 1.0)
}

/// 1 − normalized entropy of an attribute distribution.
fn concentration<'a>(values: impl Iterator<Item = &'a str>) -> f64 {
    let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
    let mut known = 0usize;
    for v in values {
        *counts.entry(v).or_default() += 1.0;
        known += 1;
    }
    if known < 2 {
        return 0.0;
    }
    let weights: Vec<f64> = counts.into_values().collect();
    (1.0 - normalized_entropy(&weights)).clamp(0.0, 1.0)
}

/// Total-variation distance between the position distributions of the
/// earlier and later halves.
fn temporal_drift(keyed: &[(&Feedback, PositionKey)]) -> f64 {
    if keyed.len() < 4 {
        return 0.0;
    }
    let (early, late) = keyed.split_at(keyed.len() / 2);
    let (a, b) = (distribution(early), distribution(late));
    let keys: std::collections::BTreeSet<&PositionKey> = a.keys().chain(b.keys()).copied().collect();
    let tvd: f64 = keys
        .iter()
        .map(|k| (a.get(k).unwrap_or(&0.0) - b.get(k).unwrap_or(&0.0)).abs())
        .sum::<f64>()
        / 2.0;
    tvd.clamp(0.0, 1.0)
}

fn distribution<'a>(half: &'a [(&Feedback, PositionKey)]) -> BTreeMap<&'a PositionKey, f64> {
    let mut d = BTreeMap::new();
    for (_, k) in half {
        *d.entry(k).or_default() += 1.0 / half.len() as f64;
    }
    d
}

/// Mean share of each evaluator's prior positions equal to the current one.
fn confirmation_bias(keyed: &[(&Feedback, PositionKey)]) -> f64 {
    let shares: Vec<f64> = keyed
        .iter()
        .filter(|(f, _)| !f.prior_positions.is_empty())
        .map(|(f, k)| {
            let same = f.prior_positions.iter().filter(|p| *p == k).count();
            same as f64 / f.prior_positions.len() as f64
        })
        .collect();
    if shares.is_empty() {
        0.0
    } else {
        shares.iter().sum::<f64>() / shares.len() as f64
    }
}

/// |Pearson| between submission rank and agreement with the first
/// submission, over the submissions after the first.
fn anchoring_bias(keyed: &[(&Feedback, PositionKey)]) -> f64 {
    let Some(((_, first), rest)) = keyed.split_first() else {
        return 0.0;
    };
    if keyed.len() < 3 {
        return 0.0;
    }
    let ranks: Vec<f64> = (1..=rest.len()).map(|r| r as f64).collect();
    let agrees: Vec<f64> = rest
        .iter()
        .map(|(_, k)| if k == first { 1.0 } else { 0.0 })
        .collect();
    pearson(&ranks, &agrees).map_or(0.0, |r| r.abs().clamp(0.0, 1.0))
}

/// Pearson correlation, `None` when either series is constant.
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean = |v: &[f64]| v[..n].iter().sum::<f64>() / n as f64;
    let (mx, my) = (mean(xs), mean(ys));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= f64::EPSILON || vy <= f64::EPSILON {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::EvaluatorProfile;
    use chrono::{Duration, TimeZone, Utc};
    use concord_registry::TaskTypeRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn classification() -> Arc<TaskTypeDefinition> {
        TaskTypeRegistry::with_builtins().get("classification").unwrap()
    }

    /// Feedback `i` submitted `i` minutes after a fixed epoch.
    fn at(i: i64, label: &str, profile: EvaluatorProfile) -> Feedback {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Feedback::new("t", format!("u{}", i), 1.0, json!({"label": label}))
            .submitted_at(t0 + Duration::minutes(i))
            .with_profile(profile)
    }

    fn profile(group: &str, profession: &str, region: &str) -> EvaluatorProfile {
        EvaluatorProfile::new(group, profession, region)
    }

    // =========================================================================
    // Report
    // =========================================================================

    #[test]
    fn test_zero_vector_is_low() {
        let report = BiasReport::from_dimensions("t", BiasDimensions::default(), &BiasConfig::default());
        assert_eq!(report.total_bias_score, 0.0);
        assert_eq!(report.level, BiasLevel::Low);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_unit_vector_is_high() {
        let report = BiasReport::from_dimensions("t", BiasDimensions::uniform(1.0), &BiasConfig::default());
        assert!((report.total_bias_score - 6f64.sqrt()).abs() < 1e-12);
        assert!((report.total_bias_score - 2.449).abs() < 1e-3);
        assert_eq!(report.level, BiasLevel::High);
        assert_eq!(report.recommendations.len(), 6);
    }

    #[test]
    fn test_level_boundaries() {
        let levels = BiasLevelThresholds::default();
        assert_eq!(levels.classify(0.5), BiasLevel::Low);
        assert_eq!(levels.classify(0.51), BiasLevel::Medium);
        assert_eq!(levels.classify(1.0), BiasLevel::Medium);
        assert_eq!(levels.classify(1.01), BiasLevel::High);
    }

    #[test]
    fn test_alert_only_above_threshold() {
        let dims = BiasDimensions {
            temporal_drift: 0.7,
            anchoring_bias: 0.71,
            ..BiasDimensions::default()
        };
        let report = BiasReport::from_dimensions("t", dims, &BiasConfig::default());
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].dimension, BiasDimension::AnchoringBias);
        assert!(!report.recommendations[0].mitigation.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(BiasConfig::default().validate().is_ok());
        let mut bad = BiasConfig::default();
        bad.levels.low = 2.0;
        assert!(BiasAnalyzer::new(bad).is_err());
        let mut bad = BiasConfig::default();
        bad.alert_thresholds.confirmation_bias = 1.5;
        assert!(bad.validate().is_err());
    }

    // =========================================================================
    // Dimensions
    // =========================================================================

    #[test]
    fn test_empty_feedback_reports_zero() {
        let report = BiasAnalyzer::default().analyze("t", &classification(), &[]);
        assert_eq!(report.dimensions, BiasDimensions::default());
    }

    #[test]
    fn test_demographic_perfect_split() {
        let set = vec![
            at(0, "spam", profile("a", "p0", "r0")),
            at(1, "spam", profile("a", "p1", "r1")),
            at(2, "ham", profile("b", "p2", "r2")),
            at(3, "ham", profile("b", "p3", "r3")),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert!((report.dimensions.demographic_correlation - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_demographic_independent() {
        let set = vec![
            at(0, "spam", profile("a", "p", "r")),
            at(1, "ham", profile("a", "p", "r")),
            at(2, "spam", profile("b", "p", "r")),
            at(3, "ham", profile("b", "p", "r")),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert!(report.dimensions.demographic_correlation.abs() < 1e-12);
    }

    #[test]
    fn test_professional_and_geographic_concentration() {
        let same = vec![
            at(0, "spam", profile("a", "nurse", "eu")),
            at(1, "spam", profile("b", "nurse", "us")),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &same);
        assert_eq!(report.dimensions.professional_clustering, 1.0);
        assert!(report.dimensions.geographic_concentration.abs() < 1e-12);
    }

    #[test]
    fn test_concentration_needs_two_known() {
        let one = vec![
            at(0, "spam", profile("a", "nurse", "eu")),
            at(1, "spam", EvaluatorProfile::default()),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &one);
        assert_eq!(report.dimensions.professional_clustering, 0.0);
    }

    #[test]
    fn test_temporal_drift_full_shift() {
        let set = vec![
            at(0, "spam", EvaluatorProfile::default()),
            at(1, "spam", EvaluatorProfile::default()),
            at(2, "ham", EvaluatorProfile::default()),
            at(3, "ham", EvaluatorProfile::default()),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert!((report.dimensions.temporal_drift - 1.0).abs() < 1e-12);
        assert!(report
            .recommendations
            .iter()
            .any(|a| a.dimension == BiasDimension::TemporalDrift));
    }

    #[test]
    fn test_temporal_drift_needs_four() {
        let set = vec![
            at(0, "spam", EvaluatorProfile::default()),
            at(1, "ham", EvaluatorProfile::default()),
            at(2, "ham", EvaluatorProfile::default()),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert_eq!(report.dimensions.temporal_drift, 0.0);
    }

    #[test]
    fn test_confirmation_bias() {
        let set = vec![
            at(0, "spam", EvaluatorProfile::default())
                .with_prior_positions(vec![PositionKey::new("spam"), PositionKey::new("spam")]),
            at(1, "ham", EvaluatorProfile::default())
                .with_prior_positions(vec![PositionKey::new("spam"), PositionKey::new("ham")]),
            at(2, "ham", EvaluatorProfile::default()),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert!((report.dimensions.confirmation_bias - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_anchoring_bias() {
        // Agreement with the first submission fades with rank.
        let set = vec![
            at(0, "spam", EvaluatorProfile::default()),
            at(1, "spam", EvaluatorProfile::default()),
            at(2, "spam", EvaluatorProfile::default()),
            at(3, "ham", EvaluatorProfile::default()),
            at(4, "ham", EvaluatorProfile::default()),
        ];
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        assert!(report.dimensions.anchoring_bias > 0.8);

        let unanimous: Vec<_> = (0..4).map(|i| at(i, "spam", EvaluatorProfile::default())).collect();
        let report = BiasAnalyzer::default().analyze("t", &classification(), &unanimous);
        assert_eq!(report.dimensions.anchoring_bias, 0.0);
    }

    #[test]
    fn test_all_dimensions_bounded() {
        let set: Vec<_> = (0..12)
            .map(|i| {
                let label = ["spam", "ham", "phish"][(i % 3) as usize];
                at(i, label, profile(&format!("g{}", i % 2), "p", &format!("r{}", i % 4)))
                    .with_prior_positions(vec![PositionKey::new(label)])
            })
            .collect();
        let report = BiasAnalyzer::default().analyze("t", &classification(), &set);
        for d in BiasDimension::ALL {
            let v = report.dimensions.get(d);
            assert!((0.0..=1.0).contains(&v), "{} = {}", d, v);
        }
        assert!(report.total_bias_score <= 6f64.sqrt() + 1e-12);
    }
}
