//! # Authority Scorer
//!
//! ```text
//! authority = α·baseline + β·track_record + γ·recent_performance
//!
//!   α + β + γ = 1 (± 1e-9), each ≥ 0        enforced at load
//!   α ≤ 0.6 (guardrail cap, configurable)    enforced at load
//!   authority ∈ [0, 2]                       enforced on output
//! ```
//!
//! The guardrail cap keeps credentials alone from dominating a user's weight
//! in aggregation: with the default cap at least 40% of authority always comes
//! from demonstrated performance.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ScoringError};

/// Upper bound on any authority score.
pub const AUTHORITY_CEILING: f64 = 2.0;

/// Tolerance on the weight sum.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-9;

/// Mixing weights α, β, γ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityWeights {
    pub baseline: f64,
    pub track_record: f64,
    pub recent_performance: f64,
}

impl Default for AuthorityWeights {
    fn default() -> Self {
        Self {
            baseline: 0.4,
            track_record: 0.4,
            recent_performance: 0.2,
        }
    }
}

impl AuthorityWeights {
    #[must_use]
    pub const fn new(baseline: f64, track_record: f64, recent_performance: f64) -> Self {
        Self {
            baseline,
            track_record,
            recent_performance,
        }
    }

    pub fn sum(&self) -> f64 {
        self.baseline + self.track_record + self.recent_performance
    }

    fn components(&self) -> [(&'static str, f64); 3] {
        [
            ("baseline", self.baseline),
            ("track_record", self.track_record),
            ("recent_performance", self.recent_performance),
        ]
    }
}

/// Guardrail caps on individual weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightCaps {
    pub baseline: f64,
    pub track_record: f64,
    pub recent_performance: f64,
}

impl Default for WeightCaps {
    fn default() -> Self {
        Self {
            baseline: 0.6,
            track_record: 1.0,
            recent_performance: 1.0,
        }
    }
}

impl WeightCaps {
    fn components(&self) -> [f64; 3] {
        [self.baseline, self.track_record, self.recent_performance]
    }
}

/// Weights plus their caps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    pub weights: AuthorityWeights,
    pub caps: WeightCaps,
}

impl AuthorityConfig {
    /// # Errors
    ///
    /// [`ScoringError::InvalidWeights`] for negative, non-finite or
    /// non-unit-sum weights (or malformed caps),
    /// [`ScoringError::WeightCapExceeded`] when a weight is above its cap.
    pub fn validate(&self) -> Result<()> {
        for (name, cap) in self
            .weights
            .components()
            .iter()
            .map(|(n, _)| *n)
            .zip(self.caps.components())
        {
            if !(cap.is_finite() && (0.0..=1.0).contains(&cap)) {
                return Err(ScoringError::InvalidWeights(format!(
                    "cap for '{}' must be in [0, 1], got {}",
                    name, cap
                )));
            }
        }
        for (name, value) in self.weights.components() {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::InvalidWeights(format!(
                    "'{}' must be finite and >= 0, got {}",
                    name, value
                )));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ScoringError::InvalidWeights(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }
        for ((name, value), cap) in self.weights.components().into_iter().zip(self.caps.components()) {
            if value > cap + WEIGHT_SUM_EPSILON {
                return Err(ScoringError::WeightCapExceeded {
                    component: name,
                    value,
                    cap,
                });
            }
        }
        Ok(())
    }
}

/// Computes authority from validated weights.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityScorer {
    weights: AuthorityWeights,
}

fn finite_or_zero(name: &'static str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        warn!(input = name, "non-finite authority input, using 0");
        0.0
    }
}

impl AuthorityScorer {
    pub fn new(config: &AuthorityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            weights: config.weights,
        })
    }

    /// Authority in `[0, 2]`.
    ///
    /// Inputs are clamped to their own domains first: baseline to `[0, 2]`,
    /// track record and recent performance to `[0, 1]`.
    pub fn compute(&self, baseline: f64, track_record: f64, recent_performance: f64) -> f64 {
        let b = finite_or_zero("baseline", baseline).clamp(0.0, AUTHORITY_CEILING);
        let t = finite_or_zero("track_record", track_record).clamp(0.0, 1.0);
        let r = finite_or_zero("recent_performance", recent_performance).clamp(0.0, 1.0);
        let w = &self.weights;
        (w.baseline * b + w.track_record * t + w.recent_performance * r).clamp(0.0, AUTHORITY_CEILING)
    }

    pub fn weights(&self) -> AuthorityWeights {
        self.weights
    }
}
