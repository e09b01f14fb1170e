//! Position equality and consistency rules.
//!
//! An [`EqualityRule`] maps a feedback payload to a [`PositionKey`]; feedback
//! with equal keys is one position during aggregation. A [`ConsistencyRule`]
//! scores how close a payload is to an emitted position, in `[0, 1]`, and is
//! the per-submission quality signal fed into track-record smoothing.
//!
//! Both rules are plain data except for their `Custom` variants, which hold a
//! shared closure so a task type can plug in domain logic without touching
//! the aggregator.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::canonicalize::canonicalize;
use crate::models::PositionKey;

/// Closure deriving a position key from a payload.
pub type KeyFn = Arc<dyn Fn(&Value) -> Option<PositionKey> + Send + Sync>;

/// Closure scoring the similarity of a payload to a position payload.
pub type SimilarityFn = Arc<dyn Fn(&Value, &Value) -> f64 + Send + Sync>;

/// How feedback payloads are clustered into positions.
#[derive(Clone)]
pub enum EqualityRule {
    /// Canonical JSON equality over the listed fields. Missing fields read
    /// as null; if every listed field is missing there is no position.
    Exact { fields: Vec<String> },
    /// Case-, whitespace- and trailing-punctuation-insensitive equality of
    /// one string field.
    NormalizedText { field: String },
    /// Numeric field floored into buckets of `width`.
    NumericBucket { field: String, width: f64 },
    /// Task-type supplied key function.
    Custom(KeyFn),
}

impl EqualityRule {
    /// Derives the position key of a payload, or `None` when the payload
    /// does not carry the fields the rule needs.
    pub fn position_key(&self, payload: &Value) -> Option<PositionKey> {
        match self {
            EqualityRule::Exact { fields } => {
                let mut selected = Map::new();
                let mut present = false;
                for field in fields {
                    let value = payload.get(field).cloned().unwrap_or(Value::Null);
                    present |= !value.is_null();
                    selected.insert(field.clone(), value);
                }
                present.then(|| PositionKey::new(canonicalize(&Value::Object(selected))))
            }
            EqualityRule::NormalizedText { field } => payload
                .get(field)
                .and_then(Value::as_str)
                .map(normalize_text)
                .filter(|s| !s.is_empty())
                .map(PositionKey::new),
            EqualityRule::NumericBucket { field, width } => {
                let value = payload.get(field).and_then(Value::as_f64)?;
                if !value.is_finite() || *width <= 0.0 {
                    return None;
                }
                // `+ 0.0` folds -0.0 into 0.0 so both render as "0".
                let bucket = (value / width).floor() * width + 0.0;
                Some(PositionKey::new(format!("{}", bucket)))
            }
            EqualityRule::Custom(key_fn) => key_fn(payload),
        }
    }

    /// Fields the rule reads, when statically known.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            EqualityRule::Exact { fields } => fields.iter().map(String::as_str).collect(),
            EqualityRule::NormalizedText { field } | EqualityRule::NumericBucket { field, .. } => {
                vec![field.as_str()]
            }
            EqualityRule::Custom(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for EqualityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualityRule::Exact { fields } => f.debug_struct("Exact").field("fields", fields).finish(),
            EqualityRule::NormalizedText { field } => {
                f.debug_struct("NormalizedText").field("field", field).finish()
            }
            EqualityRule::NumericBucket { field, width } => f
                .debug_struct("NumericBucket")
                .field("field", field)
                .field("width", width)
                .finish(),
            EqualityRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a payload is scored against an emitted position.
#[derive(Clone)]
pub enum ConsistencyRule {
    /// 1.0 when the payload's position key equals the position's, else 0.0.
    ExactMatch,
    /// Jaccard overlap of normalized word tokens of one string field.
    TokenOverlap { field: String },
    /// `1 - |a - b| / tolerance`, floored at zero.
    NumericProximity { field: String, tolerance: f64 },
    /// Task-type supplied similarity.
    Custom(SimilarityFn),
}

impl ConsistencyRule {
    /// Scores `payload` against the representative payload of a position.
    ///
    /// `equality` is the task type's clustering rule; `ExactMatch` compares
    /// through it so that consistency agrees with clustering. The result is
    /// always within `[0, 1]`; non-finite custom scores read as 0.
    pub fn similarity(&self, equality: &EqualityRule, payload: &Value, position: &Value) -> f64 {
        let raw = match self {
            ConsistencyRule::ExactMatch => {
                match (equality.position_key(payload), equality.position_key(position)) {
                    (Some(a), Some(b)) if a == b => 1.0,
                    _ => 0.0,
                }
            }
            ConsistencyRule::TokenOverlap { field } => {
                match (
                    payload.get(field).and_then(Value::as_str),
                    position.get(field).and_then(Value::as_str),
                ) {
                    (Some(a), Some(b)) => jaccard(a, b),
                    _ => 0.0,
                }
            }
            ConsistencyRule::NumericProximity { field, tolerance } => {
                match (
                    payload.get(field).and_then(Value::as_f64),
                    position.get(field).and_then(Value::as_f64),
                ) {
                    (Some(a), Some(b)) if *tolerance > 0.0 => 1.0 - (a - b).abs() / tolerance,
                    (Some(a), Some(b)) => {
                        if a == b {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    _ => 0.0,
                }
            }
            ConsistencyRule::Custom(sim) => sim(payload, position),
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl fmt::Debug for ConsistencyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyRule::ExactMatch => f.write_str("ExactMatch"),
            ConsistencyRule::TokenOverlap { field } => {
                f.debug_struct("TokenOverlap").field("field", field).finish()
            }
            ConsistencyRule::NumericProximity { field, tolerance } => f
                .debug_struct("NumericProximity")
                .field("field", field)
                .field("tolerance", tolerance)
                .finish(),
            ConsistencyRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Lowercases, collapses whitespace and strips trailing punctuation.
pub fn normalize_text(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_end()
        .to_string()
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}
