//! # Feedback Council
//!
//! Authority-weighted aggregation of independent evaluator feedback, with
//! disagreement preserved when it is informative.
//!
//! ## Overview
//!
//! Each task collects feedback from many evaluators. The council turns that
//! set into one reportable result without forcing a false consensus:
//!
//! - **Consensus aggregation** clusters feedback into positions, weights
//!   them by authority snapshot, and measures disagreement as normalized
//!   Shannon entropy. Low disagreement reports one answer; high
//!   disagreement keeps the supported alternatives alongside it.
//! - **Bias analysis** scores six kinds of systematic skew in the same set,
//!   strictly as an advisory side channel.
//! - **Devil's advocates** are drawn at random from the eligible pool to
//!   argue against the majority, and scored afterwards on how much they
//!   moved the discussion.
//!
//! ## Architecture
//!
//! ```text
//!   Feedback set (authority snapshots)
//!          │
//!          ├──────────────────────────┐
//!          ▼                          ▼
//!  ┌────────────────┐        ┌────────────────┐
//!  │   CONSENSUS    │        │      BIAS      │   advisory only
//!  │   AGGREGATOR   │        │    ANALYZER    │
//!  └───────┬────────┘        └────────────────┘
//!          │ result + per-feedback quality
//!          ▼
//!   track record / authority (concord-scoring)
//!          │
//!          ▼
//!  ┌────────────────┐
//!  │   ADVOCATE     │   next cycle's critical reviewers
//!  │   ASSIGNER     │
//!  └────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use concord_council::{ConsensusAggregator, Feedback};
//! use concord_registry::TaskTypeRegistry;
//! use serde_json::json;
//!
//! let registry = TaskTypeRegistry::with_builtins();
//! let classification = registry.get("classification").unwrap();
//!
//! let feedback = vec![
//!     Feedback::new("task-1", "alice", 1.4, json!({"label": "spam"})),
//!     Feedback::new("task-1", "bob", 0.6, json!({"label": "ham"})),
//! ];
//! let outcome = ConsensusAggregator::default()
//!     .aggregate("task-1", &classification, &feedback)
//!     .unwrap();
//!
//! assert!(outcome.result.uncertainty_preserved);
//! assert_eq!(outcome.result.alternative_positions.len(), 1);
//! ```
//!
//! ## References
//!
//! - Shannon, C. E. (1948). "A Mathematical Theory of Communication"
//!   *Bell System Technical Journal*, 27(3), 379-423.
//! - Janis, I. L. (1972). *Victims of Groupthink*. Houghton Mifflin.

pub mod advocate;
pub mod bias;
pub mod consensus;
pub mod error;
pub mod feedback;

pub use advocate::{
    assignment_probability, AdvocateAssigner, AdvocateAssignment, AdvocateConfig, Candidate,
    EffectivenessReport, EffectivenessWeights,
};
pub use bias::{
    BiasAlert, BiasAnalyzer, BiasConfig, BiasDimension, BiasDimensions, BiasLevel,
    BiasLevelThresholds, BiasReport,
};
pub use consensus::{
    disagreement_of, normalized_entropy, AggregationOutcome, AggregationResult,
    AggregatorConfig, AlternativePosition, ConsensusAggregator, ConsistencyScore,
    PositionSummary,
};
pub use error::{CouncilError, Result};
pub use feedback::{canonical_order, EvaluatorProfile, Feedback, TaskId, UserId};
