//! # Credential Formula Sandbox
//!
//! A tiny arithmetic language for turning a credential's numeric value into
//! a score, e.g. `min(2, ln(1 + x) / 2)` for a publication count.
//!
//! ## Grammar
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | power
//! power  := atom ('^' unary)?            right-associative
//! atom   := number | 'x' | 'value' | 'pi' | 'e'
//!         | func '(' expr (',' expr)* ')'
//!         | '(' expr ')'
//! func   := abs | sqrt | ln | log10 | log2 | exp
//!         | floor | ceil | round | min | max | clamp
//! ```
//!
//! ## Threat Model
//!
//! Formulas come from operator configuration, which is hot-reloaded. The
//! sandbox therefore assumes the source is untrusted:
//!
//! | Attack | Defense |
//! |--------|---------|
//! | Call arbitrary code | No identifiers outside the whitelist parse |
//! | Blow the stack | Nesting depth ≤ [`MAX_DEPTH`] checked while parsing |
//! | Burn CPU | Node count ≤ [`MAX_NODES`], fuel metering, wall-clock deadline |
//! | Huge input | Source length ≤ [`MAX_SOURCE_LEN`] |
//!
//! Evaluation cost depends only on the tree shape, so [`Formula::parse_with_budget`]
//! rejects a formula whose static cost exceeds the step budget before it is
//! ever run. [`Formula::probe`] additionally runs the formula over a fixed
//! sample set so a configuration that cannot meet its deadline is rejected
//! at load time rather than at scoring time.

use std::fmt;

use crate::budget::{EvalBudget, FuelMeter, NodeCost};
use crate::error::FormulaError;

/// Maximum formula source length in bytes.
pub const MAX_SOURCE_LEN: usize = 256;

/// Maximum number of AST nodes.
pub const MAX_NODES: usize = 128;

/// Maximum nesting depth (parentheses, unary minus, calls, exponents).
pub const MAX_DEPTH: usize = 32;

/// Inputs used by [`Formula::probe`].
pub const PROBE_SAMPLES: [f64; 5] = [0.0, 1.0, 5.0, 10.0, 100.0];

/// Whitelisted functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Sqrt,
    Ln,
    Log10,
    Log2,
    Exp,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Clamp,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "ln" => Self::Ln,
            "log10" => Self::Log10,
            "log2" => Self::Log2,
            "exp" => Self::Exp,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "clamp" => Self::Clamp,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Exp => "exp",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Clamp => "clamp",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Self::Min | Self::Max => 2,
            Self::Clamp => 3,
            _ => 1,
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        match (self, args) {
            (Self::Abs, [a]) => a.abs(),
            (Self::Sqrt, [a]) => a.sqrt(),
            (Self::Ln, [a]) => a.ln(),
            (Self::Log10, [a]) => a.log10(),
            (Self::Log2, [a]) => a.log2(),
            (Self::Exp, [a]) => a.exp(),
            (Self::Floor, [a]) => a.floor(),
            (Self::Ceil, [a]) => a.ceil(),
            (Self::Round, [a]) => a.round(),
            (Self::Min, [a, b]) => a.min(*b),
            (Self::Max, [a, b]) => a.max(*b),
            // f64::clamp panics on lo > hi; this form never does.
            (Self::Clamp, [v, lo, hi]) => v.max(*lo).min(*hi),
            _ => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var,
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn cost(&self) -> NodeCost {
        match self {
            Expr::Num(_) => NodeCost::Literal,
            Expr::Var => NodeCost::Variable,
            Expr::Neg(_) | Expr::Bin(..) => NodeCost::Operator,
            Expr::Call(..) => NodeCost::Call,
        }
    }

    /// Total fuel one evaluation of this subtree consumes.
    fn static_cost(&self) -> u64 {
        let own = self.cost().fuel();
        match self {
            Expr::Num(_) | Expr::Var => own,
            Expr::Neg(inner) => own + inner.static_cost(),
            Expr::Bin(_, l, r) => own + l.static_cost() + r.static_cost(),
            Expr::Call(_, args) => own + args.iter().map(Expr::static_cost).sum::<u64>(),
        }
    }

    fn eval(&self, x: f64, meter: &mut FuelMeter) -> Result<f64, FormulaError> {
        meter.charge(self.cost())?;
        let out = match self {
            Expr::Num(n) => *n,
            Expr::Var => x,
            Expr::Neg(inner) => -inner.eval(x, meter)?,
            Expr::Bin(op, l, r) => {
                let a = l.eval(x, meter)?;
                let b = r.eval(x, meter)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, args) => {
                let mut values = [0.0; 3];
                for (slot, arg) in values.iter_mut().zip(args) {
                    *slot = arg.eval(x, meter)?;
                }
                func.apply(&values[..args.len()])
            }
        };
        // Checked per node: min/max would otherwise swallow a NaN.
        if out.is_finite() {
            Ok(out)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let single = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'^' => Some(Token::Caret),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = single {
            tokens.push((start, tok));
            i += 1;
        } else if c.is_ascii_digit() || c == b'.' {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &src[start..i];
            let n: f64 = text.parse().map_err(|_| FormulaError::Syntax {
                offset: start,
                message: format!("invalid number '{}'", text),
            })?;
            tokens.push((start, Token::Num(n)));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(src[start..i].to_string())));
        } else {
            let ch = src[start..].chars().next().unwrap_or('?');
            return Err(FormulaError::Syntax {
                offset: start,
                message: format!("unexpected character '{}'", ch),
            });
        }
    }
    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn syntax(&self, message: impl Into<String>) -> FormulaError {
        FormulaError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, want: &Token, what: &str) -> Result<(), FormulaError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.syntax(format!("expected {}", what)))
        }
    }

    fn node(&mut self, expr: Expr) -> Result<Expr, FormulaError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(FormulaError::TooComplex(format!(
                "more than {} nodes",
                MAX_NODES
            )));
        }
        Ok(expr)
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooComplex(format!(
                "nesting deeper than {}",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.node(Expr::Bin(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.node(Expr::Bin(op, Box::new(left), Box::new(right)))?;
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return self.node(Expr::Neg(Box::new(inner)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.peek() != Some(&Token::Caret) {
            return Ok(base);
        }
        self.pos += 1;
        self.descend()?;
        let exponent = self.unary()?;
        self.depth -= 1;
        self.node(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)))
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let Some((_, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.syntax("unexpected end of formula"));
        };
        self.pos += 1;
        match token {
            Token::Num(n) => self.node(Expr::Num(n)),
            Token::LParen => {
                self.descend()?;
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "x" | "value" => self.node(Expr::Var),
                "pi" => self.node(Expr::Num(std::f64::consts::PI)),
                "e" => self.node(Expr::Num(std::f64::consts::E)),
                _ => {
                    let func = Func::lookup(&name)
                        .ok_or_else(|| FormulaError::DisallowedIdentifier(name.clone()))?;
                    self.call(func)
                }
            },
            other => {
                self.pos -= 1;
                Err(self.syntax(format!("unexpected token {:?}", other)))
            }
        }
    }

    fn call(&mut self, func: Func) -> Result<Expr, FormulaError> {
        self.expect(&Token::LParen, "'(' after function name")?;
        self.descend()?;
        let mut args = vec![self.expr()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.expr()?);
        }
        self.expect(&Token::RParen, "')'")?;
        self.depth -= 1;
        if args.len() != func.arity() {
            return Err(FormulaError::Arity {
                name: func.name().to_string(),
                expected: func.arity().to_string(),
                got: args.len(),
            });
        }
        self.node(Expr::Call(func, args))
    }
}

// =============================================================================
// Formula
// =============================================================================

/// A parsed, statically checked credential formula.
#[derive(Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Expr,
    cost: u64,
}

impl Formula {
    /// Parses a formula under the static size limits.
    ///
    /// # Errors
    ///
    /// [`FormulaError::Syntax`], [`FormulaError::DisallowedIdentifier`],
    /// [`FormulaError::Arity`] or [`FormulaError::TooComplex`].
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(FormulaError::TooComplex(format!(
                "source longer than {} bytes",
                MAX_SOURCE_LEN
            )));
        }
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
            nodes: 0,
        };
        let root = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.syntax("trailing input"));
        }
        let cost = root.static_cost();
        Ok(Self {
            source: source.to_string(),
            root,
            cost,
        })
    }

    /// Parses and checks that one evaluation fits in `budget.max_steps`.
    pub fn parse_with_budget(source: &str, budget: &EvalBudget) -> Result<Self, FormulaError> {
        let formula = Self::parse(source)?;
        if formula.cost > budget.max_steps {
            return Err(FormulaError::StepBudgetExceeded {
                limit: budget.max_steps,
            });
        }
        Ok(formula)
    }

    /// Evaluates with `x` bound to `value`.
    ///
    /// # Errors
    ///
    /// Budget overruns and [`FormulaError::NonFinite`].
    pub fn evaluate(&self, value: f64, budget: &EvalBudget) -> Result<f64, FormulaError> {
        let mut meter = FuelMeter::start(budget);
        self.root.eval(value, &mut meter)
    }

    /// Runs the formula over [`PROBE_SAMPLES`], failing on the first budget
    /// overrun. Non-finite results are allowed here; they only zero the
    /// affected credential term at scoring time.
    pub fn probe(&self, budget: &EvalBudget) -> Result<(), FormulaError> {
        for sample in PROBE_SAMPLES {
            match self.evaluate(sample, budget) {
                Err(e) if e.is_budget_overrun() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fuel one evaluation consumes.
    pub fn cost(&self) -> u64 {
        self.cost
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("source", &self.source)
            .field("cost", &self.cost)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, x: f64) -> f64 {
        Formula::parse(src)
            .unwrap()
            .evaluate(x, &EvalBudget::default())
            .unwrap()
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_eq!(eval("-2 ^ 2", 0.0), -4.0);
        assert_eq!(eval("10 - 4 - 3", 0.0), 3.0);
    }

    #[test]
    fn test_variable_and_alias() {
        assert_eq!(eval("x * 2", 1.5), 3.0);
        assert_eq!(eval("value + 1", 1.5), 2.5);
    }

    #[test]
    fn test_whitelisted_functions() {
        assert!((eval("ln(e)", 0.0) - 1.0).abs() < 1e-12);
        assert!((eval("log10(1000)", 0.0) - 3.0).abs() < 1e-12);
        assert_eq!(eval("log2(8)", 0.0), 3.0);
        assert_eq!(eval("min(x, 2)", 5.0), 2.0);
        assert_eq!(eval("max(x, 2)", 5.0), 5.0);
        assert_eq!(eval("clamp(x, 0, 1)", 5.0), 1.0);
        assert_eq!(eval("clamp(x, 0, 1)", -5.0), 0.0);
        assert_eq!(eval("floor(2.7) + ceil(2.1) + round(2.5)", 0.0), 8.0);
        assert_eq!(eval("abs(-x)", 3.0), 3.0);
        assert_eq!(eval("sqrt(16)", 0.0), 4.0);
    }

    #[test]
    fn test_inverted_clamp_bounds_do_not_panic() {
        assert_eq!(eval("clamp(0.5, 1, 0)", 0.0), 0.0);
    }

    #[test]
    fn test_non_finite_is_an_error() {
        let f = Formula::parse("ln(x)").unwrap();
        assert_eq!(
            f.evaluate(0.0, &EvalBudget::default()),
            Err(FormulaError::NonFinite)
        );
        let f = Formula::parse("min(1 / x, 2)").unwrap();
        assert_eq!(
            f.evaluate(0.0, &EvalBudget::default()),
            Err(FormulaError::NonFinite)
        );
    }

    // =========================================================================
    // Rejection
    // =========================================================================

    #[test]
    fn test_disallowed_identifier() {
        assert_eq!(
            Formula::parse("system(1)"),
            Err(FormulaError::DisallowedIdentifier("system".to_string()))
        );
        assert!(matches!(
            Formula::parse("y + 1"),
            Err(FormulaError::DisallowedIdentifier(_))
        ));
    }

    #[test]
    fn test_disallowed_operators() {
        for src in ["x % 2", "x == 1", "x; 1", "\"s\"", "x[0]"] {
            assert!(
                matches!(Formula::parse(src), Err(FormulaError::Syntax { .. })),
                "{} should be rejected",
                src
            );
        }
    }

    #[test]
    fn test_arity() {
        assert!(matches!(
            Formula::parse("min(1)"),
            Err(FormulaError::Arity { got: 1, .. })
        ));
        assert!(matches!(
            Formula::parse("sqrt(1, 2)"),
            Err(FormulaError::Arity { got: 2, .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(Formula::parse(""), Err(FormulaError::Syntax { .. })));
        assert!(matches!(Formula::parse("(1 + 2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(Formula::parse("1 2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(Formula::parse("1..2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(Formula::parse("sqrt 4"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_static_limits() {
        let long = "1+".repeat(200) + "1";
        assert!(matches!(Formula::parse(&long), Err(FormulaError::TooComplex(_))));

        let deep = "(".repeat(40) + "x" + &")".repeat(40);
        assert!(matches!(Formula::parse(&deep), Err(FormulaError::TooComplex(_))));

        let wide = vec!["x"; 100].join("+");
        assert!(matches!(Formula::parse(&wide), Err(FormulaError::TooComplex(_))));
    }

    // =========================================================================
    // Budget
    // =========================================================================

    #[test]
    fn test_static_cost() {
        // Bin(2) + Var(1) + Num(1)
        assert_eq!(Formula::parse("x + 1").unwrap().cost(), 4);
        // Call(5) + Var(1)
        assert_eq!(Formula::parse("sqrt(x)").unwrap().cost(), 6);
    }

    #[test]
    fn test_parse_with_budget_rejects_expensive_formula() {
        let budget = EvalBudget::new(5, 5_000);
        assert!(Formula::parse_with_budget("x + 1", &budget).is_ok());
        assert_eq!(
            Formula::parse_with_budget("sqrt(x)", &budget),
            Err(FormulaError::StepBudgetExceeded { limit: 5 })
        );
    }

    #[test]
    fn test_probe_tolerates_non_finite_samples() {
        let f = Formula::parse("ln(x)").unwrap();
        assert!(f.probe(&EvalBudget::default()).is_ok());
    }

    #[test]
    fn test_probe_fails_on_budget_overrun() {
        let f = Formula::parse("sqrt(sqrt(x))").unwrap();
        assert!(f.probe(&EvalBudget::new(3, 5_000)).unwrap_err().is_budget_overrun());
    }
}
