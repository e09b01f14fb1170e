//! # Authority Scoring
//!
//! Per-user scores that weight feedback during aggregation: baseline
//! credentials, smoothed track record, and the combined authority value.
//!
//! ## Pipeline
//!
//! ```text
//!   credentials ──► CredentialScorer ──► baseline ∈ [0, 2] ─┐
//!                    (lookup / sandboxed formula)           │
//!                                                           ▼
//!   cycle quality ─► TrackRecordUpdater ─► track ∈ [0, 1] ─► AuthorityScorer ─► authority ∈ [0, 2]
//!                                                           ▲
//!   cycle quality ─► mean ───────────────► recent ∈ [0, 1] ─┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`CredentialScorer`] | Compiled credential policy, never fails at scoring time |
//! | [`Formula`] | Whitelisted arithmetic sandbox with static limits |
//! | [`EvalBudget`] | Step fuel and wall-clock deadline per formula evaluation |
//! | [`AuthorityScorer`] | α·baseline + β·track + γ·recent with guardrail caps |
//! | [`TrackRecordUpdater`] | Exponential smoothing of per-cycle quality |
//!
//! ## Quick Start
//!
//! ```rust
//! use concord_scoring::{
//!     AuthorityConfig, AuthorityScorer, Credential, CredentialPolicy, CredentialScorer,
//!     CredentialType, TrackRecordConfig, TrackRecordUpdater,
//! };
//!
//! let credentials = CredentialScorer::compile(&CredentialPolicy::default())?;
//! let authority = AuthorityScorer::new(&AuthorityConfig::default())?;
//! let track = TrackRecordUpdater::new(&TrackRecordConfig::default())?;
//!
//! let baseline = credentials.score(&[Credential::verified(CredentialType::AcademicDegree, "phd")]);
//! let track_record = track.update(0.5, 0.9);
//! let score = authority.compute(baseline, track_record, 0.9);
//! assert!((0.0..=2.0).contains(&score));
//! # Ok::<(), concord_scoring::ScoringError>(())
//! ```
//!
//! ## Security Notes
//!
//! - Every configuration invariant is checked when a scorer is built
//! - Credential formulas never see anything but a single `f64`
//! - A formula overrun aborts one credential term, never the whole score

mod authority;
mod budget;
mod credential;
mod error;
mod formula;
mod track_record;

pub use authority::{
    AuthorityConfig, AuthorityScorer, AuthorityWeights, WeightCaps, AUTHORITY_CEILING,
    WEIGHT_SUM_EPSILON,
};
pub use budget::{EvalBudget, FuelMeter, NodeCost};
pub use credential::{
    Credential, CredentialPolicy, CredentialRule, CredentialScorer, CredentialType, ScoringRule,
    BASELINE_CEILING,
};
pub use error::{FormulaError, Result, ScoringError};
pub use formula::{Formula, Func, MAX_DEPTH, MAX_NODES, MAX_SOURCE_LEN, PROBE_SAMPLES};
pub use track_record::{TrackRecordConfig, TrackRecordUpdater};
