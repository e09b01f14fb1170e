//! Error types for authority scoring.
//!
//! Configuration problems surface as [`ScoringError`] when a scorer is
//! built; they are never tolerated at evaluation time. [`FormulaError`]
//! covers both parse-time rejection of a credential formula and the
//! evaluation-time overruns that abort a single credential term.

use thiserror::Error;

/// Result type alias for scoring operations.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors raised while parsing or evaluating a credential formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// The source could not be tokenized or parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the source.
        offset: usize,
        /// What went wrong.
        message: String,
    },

    /// The formula references an identifier outside the whitelist.
    #[error("identifier '{0}' is not allowed")]
    DisallowedIdentifier(String),

    /// A whitelisted function was called with the wrong arity.
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Human-readable expected arity.
        expected: String,
        /// Number of arguments supplied.
        got: usize,
    },

    /// The formula exceeds a static size limit.
    #[error("formula too complex: {0}")]
    TooComplex(String),

    /// Evaluation ran out of step fuel.
    #[error("evaluation exceeded step budget of {limit}")]
    StepBudgetExceeded {
        /// Configured step limit.
        limit: u64,
    },

    /// Evaluation ran past its wall-clock deadline.
    #[error("evaluation exceeded time budget of {limit_micros}µs")]
    TimeBudgetExceeded {
        /// Configured deadline in microseconds.
        limit_micros: u64,
    },

    /// Evaluation produced NaN or infinity.
    #[error("evaluation produced a non-finite value")]
    NonFinite,
}

impl FormulaError {
    /// Returns true for budget overruns (step or wall clock).
    pub fn is_budget_overrun(&self) -> bool {
        matches!(
            self,
            FormulaError::StepBudgetExceeded { .. } | FormulaError::TimeBudgetExceeded { .. }
        )
    }
}

/// Configuration errors for the scoring components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// Authority weights are negative, non-finite, or do not sum to 1.
    #[error("invalid authority weights: {0}")]
    InvalidWeights(String),

    /// A single authority weight exceeds its guardrail cap.
    #[error("authority weight '{component}' = {value} exceeds safety cap {cap}")]
    WeightCapExceeded {
        /// Which weight.
        component: &'static str,
        /// Configured value.
        value: f64,
        /// Guardrail cap.
        cap: f64,
    },

    /// The track-record smoothing factor is outside `[0, 1]`.
    #[error("smoothing factor must be in [0, 1], got {0}")]
    InvalidSmoothing(f64),

    /// A credential rule is malformed (weights, lookup table, bounds).
    #[error("invalid rule for credential type '{credential_type}': {reason}")]
    InvalidRule {
        /// Credential type the rule belongs to.
        credential_type: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A credential formula was rejected at load time.
    #[error("formula for credential type '{credential_type}' rejected: {source}")]
    Formula {
        /// Credential type the formula belongs to.
        credential_type: String,
        /// Underlying formula error.
        #[source]
        source: FormulaError,
    },
}
