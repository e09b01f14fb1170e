//! # Evaluation Budget
//!
//! Bounds the cost of evaluating a credential formula, the same way a gas
//! meter bounds an execution: every AST node charges a fixed amount of fuel
//! before it runs, and the wall clock is checked alongside the fuel.
//!
//! ## Cost Model
//!
//! | Node | Fuel | Rationale |
//! |------|------|-----------|
//! | Literal / constant | 1 | No work |
//! | Variable | 1 | Single lookup |
//! | Unary / binary operator | 2 | One float op plus dispatch |
//! | Function call | 5 | Transcendental functions are the expensive part |
//!
//! A formula that passes its load-time probe is therefore guaranteed to
//! finish within `max_steps` fuel for every input, since evaluation cost
//! depends only on the tree shape. The wall-clock deadline is the backstop
//! for a starved or pre-empted thread.
//!
//! ```rust
//! use concord_scoring::{EvalBudget, FuelMeter, NodeCost};
//!
//! let budget = EvalBudget::new(10, 5_000);
//! let mut meter = FuelMeter::start(&budget);
//! assert!(meter.charge(NodeCost::Call).is_ok());
//! assert!(meter.charge(NodeCost::Call).is_ok());
//! assert!(meter.charge(NodeCost::Literal).is_err());
//! assert_eq!(meter.used(), 10);
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::FormulaError;

/// Fuel cost classes for formula nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCost {
    Literal,
    Variable,
    Operator,
    Call,
}

impl NodeCost {
    /// Fuel charged for one node of this class.
    #[inline]
    #[must_use]
    pub const fn fuel(&self) -> u64 {
        match self {
            Self::Literal => 1,
            Self::Variable => 1,
            Self::Operator => 2,
            Self::Call => 5,
        }
    }
}

/// Per-evaluation limits for credential formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalBudget {
    /// Maximum fuel per evaluation.
    pub max_steps: u64,
    /// Wall-clock deadline per evaluation, in microseconds.
    pub max_micros: u64,
}

impl EvalBudget {
    #[must_use]
    pub const fn new(max_steps: u64, max_micros: u64) -> Self {
        Self {
            max_steps,
            max_micros,
        }
    }

    /// Deadline as a [`Duration`].
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_micros(self.max_micros)
    }
}

impl Default for EvalBudget {
    /// 10,000 fuel and a 5 ms deadline.
    fn default() -> Self {
        Self::new(10_000, 5_000)
    }
}

/// Running meter for one formula evaluation.
#[derive(Debug)]
pub struct FuelMeter {
    limit: u64,
    used: u64,
    started: Instant,
    deadline: Duration,
    limit_micros: u64,
}

impl FuelMeter {
    /// Starts a fresh meter; the clock begins now.
    #[must_use]
    pub fn start(budget: &EvalBudget) -> Self {
        Self {
            limit: budget.max_steps,
            used: 0,
            started: Instant::now(),
            deadline: budget.deadline(),
            limit_micros: budget.max_micros,
        }
    }

    /// Charges fuel for one node. Fuel is only deducted on success.
    ///
    /// # Errors
    ///
    /// [`FormulaError::StepBudgetExceeded`] when the fuel would overflow the
    /// limit, [`FormulaError::TimeBudgetExceeded`] once the deadline is
    /// reached.
    pub fn charge(&mut self, cost: NodeCost) -> Result<(), FormulaError> {
        let fuel = cost.fuel();
        if self.used + fuel > self.limit {
            return Err(FormulaError::StepBudgetExceeded { limit: self.limit });
        }
        if self.started.elapsed() >= self.deadline {
            return Err(FormulaError::TimeBudgetExceeded {
                limit_micros: self.limit_micros,
            });
        }
        self.used += fuel;
        Ok(())
    }

    /// Fuel consumed so far.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Fuel still available.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}
