//! Track-record smoothing.
//!
//! `track(t) = λ·track(t-1) + (1-λ)·quality(t)`. With λ = 0.95 a single
//! submission moves the score by at most 0.05, and sustained quality `q`
//! pulls the score geometrically toward `q`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ScoringError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackRecordConfig {
    /// Smoothing factor λ in `[0, 1]`.
    pub smoothing: f64,
}

impl Default for TrackRecordConfig {
    fn default() -> Self {
        Self { smoothing: 0.95 }
    }
}

impl TrackRecordConfig {
    pub fn validate(&self) -> Result<()> {
        if self.smoothing.is_finite() && (0.0..=1.0).contains(&self.smoothing) {
            Ok(())
        } else {
            Err(ScoringError::InvalidSmoothing(self.smoothing))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackRecordUpdater {
    lambda: f64,
}

impl TrackRecordUpdater {
    pub fn new(config: &TrackRecordConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lambda: config.smoothing,
        })
    }

    /// One smoothing step. Both inputs are clamped to `[0, 1]`; a non-finite
    /// quality leaves the previous score untouched.
    pub fn update(&self, previous: f64, quality: f64) -> f64 {
        let previous = if previous.is_finite() {
            previous.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if !quality.is_finite() {
            warn!(quality, "non-finite quality, track record unchanged");
            return previous;
        }
        let q = quality.clamp(0.0, 1.0);
        (self.lambda * previous + (1.0 - self.lambda) * q).clamp(0.0, 1.0)
    }

    /// Applies `update` for each quality in order.
    pub fn update_many(&self, previous: f64, qualities: impl IntoIterator<Item = f64>) -> f64 {
        qualities
            .into_iter()
            .fold(previous, |acc, q| self.update(acc, q))
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updater(lambda: f64) -> TrackRecordUpdater {
        TrackRecordUpdater::new(&TrackRecordConfig { smoothing: lambda }).unwrap()
    }

    #[test]
    fn test_single_step() {
        let next = updater(0.95).update(0.5, 0.9);
        assert!((next - 0.52).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_smoothing() {
        for bad in [-0.1, 1.1, f64::NAN] {
            assert!(matches!(
                TrackRecordUpdater::new(&TrackRecordConfig { smoothing: bad }),
                Err(ScoringError::InvalidSmoothing(_))
            ));
        }
    }

    #[test]
    fn test_edge_lambdas() {
        assert_eq!(updater(1.0).update(0.3, 1.0), 0.3);
        assert_eq!(updater(0.0).update(0.3, 1.0), 1.0);
    }

    #[test]
    fn test_converges_to_sustained_quality() {
        let t = updater(0.95).update_many(0.0, std::iter::repeat(0.8).take(1_000));
        assert!((t - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_quality_is_ignored() {
        assert_eq!(updater(0.95).update(0.4, f64::NAN), 0.4);
    }
}
