//! # Credential Scorer
//!
//! Converts a user's credentials into a baseline score:
//!
//! ```text
//! baseline = clamp( Σ weight(type) × rule(type)(value), 0, max_baseline )
//! ```
//!
//! Each credential type maps to one [`CredentialRule`]: a weight plus either
//! a discrete lookup table or a sandboxed [`Formula`] over the credential's
//! numeric value. Policies are compiled once, when configuration is loaded;
//! every formula is parsed, cost-checked and probed at that point so that a
//! bad formula is a configuration error and never a scoring-time surprise.
//!
//! Scoring itself never fails. Degradations are logged and contribute zero:
//!
//! | Situation | Contribution | Log |
//! |-----------|--------------|-----|
//! | Unverified credential (with `require_verified`) | 0 | debug |
//! | Unrecognized credential type | 0 | warn |
//! | No rule configured for the type | 0 | warn |
//! | Non-numeric value for a formula rule | 0 | warn |
//! | Formula budget overrun or non-finite result | 0 | warn |
//!
//! ```rust
//! use concord_scoring::{Credential, CredentialPolicy, CredentialScorer, CredentialType};
//!
//! let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
//! let creds = vec![
//!     Credential::verified(CredentialType::AcademicDegree, "PhD"),
//!     Credential::verified(CredentialType::YearsExperience, "10"),
//! ];
//! let baseline = scorer.score(&creds);
//! assert!(baseline > 0.0 && baseline <= 2.0);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::budget::EvalBudget;
use crate::error::{Result, ScoringError};
use crate::formula::Formula;

/// Upper bound for any baseline credential score.
pub const BASELINE_CEILING: f64 = 2.0;

/// The fixed set of credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    AcademicDegree,
    ProfessionalLicense,
    YearsExperience,
    Publications,
    Certification,
    InstitutionalAffiliation,
    PeerEndorsement,
    /// Any type string this build does not know.
    #[serde(other)]
    Unrecognized,
}

impl CredentialType {
    /// All recognized types.
    pub const KNOWN: [CredentialType; 7] = [
        CredentialType::AcademicDegree,
        CredentialType::ProfessionalLicense,
        CredentialType::YearsExperience,
        CredentialType::Publications,
        CredentialType::Certification,
        CredentialType::InstitutionalAffiliation,
        CredentialType::PeerEndorsement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::AcademicDegree => "academic_degree",
            CredentialType::ProfessionalLicense => "professional_license",
            CredentialType::YearsExperience => "years_experience",
            CredentialType::Publications => "publications",
            CredentialType::Certification => "certification",
            CredentialType::InstitutionalAffiliation => "institutional_affiliation",
            CredentialType::PeerEndorsement => "peer_endorsement",
            CredentialType::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One credential held by a user. Created and verified externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub value: String,
    #[serde(default)]
    pub verified: bool,
}

impl Credential {
    pub fn new(credential_type: CredentialType, value: impl Into<String>, verified: bool) -> Self {
        Self {
            credential_type,
            value: value.into(),
            verified,
        }
    }

    pub fn verified(credential_type: CredentialType, value: impl Into<String>) -> Self {
        Self::new(credential_type, value, true)
    }
}

/// How a credential value becomes a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringRule {
    /// Discrete value → score table. Keys match case-insensitively.
    Lookup {
        table: BTreeMap<String, f64>,
        #[serde(default)]
        default: f64,
    },
    /// Formula over the numeric value `x`.
    Expression { formula: String },
}

/// Weight and rule for one credential type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRule {
    pub weight: f64,
    pub rule: ScoringRule,
}

impl CredentialRule {
    pub fn lookup(weight: f64, table: &[(&str, f64)], default: f64) -> Self {
        Self {
            weight,
            rule: ScoringRule::Lookup {
                table: table.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                default,
            },
        }
    }

    pub fn expression(weight: f64, formula: impl Into<String>) -> Self {
        Self {
            weight,
            rule: ScoringRule::Expression {
                formula: formula.into(),
            },
        }
    }
}

/// Complete credential scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialPolicy {
    pub rules: BTreeMap<CredentialType, CredentialRule>,
    /// Cap on the summed score, at most [`BASELINE_CEILING`].
    pub max_baseline: f64,
    /// Ignore credentials whose `verified` flag is false.
    pub require_verified: bool,
    /// Per-formula evaluation budget.
    pub budget: EvalBudget,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        let rules = BTreeMap::from([
            (
                CredentialType::AcademicDegree,
                CredentialRule::lookup(
                    0.5,
                    &[
                        ("phd", 1.0),
                        ("doctorate", 1.0),
                        ("md", 1.0),
                        ("masters", 0.7),
                        ("bachelors", 0.4),
                        ("associate", 0.2),
                    ],
                    0.1,
                ),
            ),
            (
                CredentialType::ProfessionalLicense,
                CredentialRule::lookup(0.3, &[("active", 1.0), ("inactive", 0.3)], 0.5),
            ),
            (
                CredentialType::YearsExperience,
                CredentialRule::expression(0.4, "min(1, x / 20)"),
            ),
            (
                CredentialType::Publications,
                CredentialRule::expression(0.3, "min(1, ln(1 + x) / ln(51))"),
            ),
            (
                CredentialType::Certification,
                CredentialRule::lookup(0.1, &[], 0.5),
            ),
            (
                CredentialType::InstitutionalAffiliation,
                CredentialRule::lookup(0.1, &[], 0.5),
            ),
            (
                CredentialType::PeerEndorsement,
                CredentialRule::expression(0.1, "min(1, x / 10)"),
            ),
        ]);
        Self {
            rules,
            max_baseline: BASELINE_CEILING,
            require_verified: true,
            budget: EvalBudget::default(),
        }
    }
}

impl CredentialPolicy {
    /// Structural checks that don't need formula compilation.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_baseline.is_finite()
            && self.max_baseline > 0.0
            && self.max_baseline <= BASELINE_CEILING)
        {
            return Err(ScoringError::InvalidRule {
                credential_type: "*".to_string(),
                reason: format!(
                    "max_baseline must be in (0, {}], got {}",
                    BASELINE_CEILING, self.max_baseline
                ),
            });
        }
        if self.budget.max_steps == 0 || self.budget.max_micros == 0 {
            return Err(ScoringError::InvalidRule {
                credential_type: "*".to_string(),
                reason: "formula budget must be non-zero".to_string(),
            });
        }
        for (credential_type, rule) in &self.rules {
            let invalid = |reason: String| ScoringError::InvalidRule {
                credential_type: credential_type.to_string(),
                reason,
            };
            if *credential_type == CredentialType::Unrecognized {
                return Err(invalid("cannot configure a rule for unrecognized credentials".into()));
            }
            if !(rule.weight.is_finite() && rule.weight >= 0.0) {
                return Err(invalid(format!("weight must be finite and >= 0, got {}", rule.weight)));
            }
            if let ScoringRule::Lookup { table, default } = &rule.rule {
                if !default.is_finite() {
                    return Err(invalid("lookup default must be finite".into()));
                }
                if let Some((key, _)) = table.iter().find(|(_, v)| !v.is_finite()) {
                    return Err(invalid(format!("lookup entry '{}' is not finite", key)));
                }
            }
        }
        Ok(())
    }
}

enum CompiledRule {
    Lookup {
        table: BTreeMap<String, f64>,
        default: f64,
    },
    Expression(Formula),
}

struct Compiled {
    weight: f64,
    rule: CompiledRule,
}

/// A validated, compiled [`CredentialPolicy`].
pub struct CredentialScorer {
    rules: BTreeMap<CredentialType, Compiled>,
    max_baseline: f64,
    require_verified: bool,
    budget: EvalBudget,
}

impl fmt::Debug for CredentialScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialScorer")
            .field("types", &self.rules.keys().collect::<Vec<_>>())
            .field("max_baseline", &self.max_baseline)
            .field("require_verified", &self.require_verified)
            .finish()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl CredentialScorer {
    /// Validates the policy and compiles every formula.
    ///
    /// # Errors
    ///
    /// [`ScoringError::InvalidRule`] for structural problems,
    /// [`ScoringError::Formula`] for a formula that fails to parse, exceeds
    /// the static limits, or overruns its budget on the probe samples.
    pub fn compile(policy: &CredentialPolicy) -> Result<Self> {
        policy.validate()?;
        let mut rules = BTreeMap::new();
        for (credential_type, rule) in &policy.rules {
            let compiled = match &rule.rule {
                ScoringRule::Lookup { table, default } => CompiledRule::Lookup {
                    table: table.iter().map(|(k, v)| (normalize(k), *v)).collect(),
                    default: *default,
                },
                ScoringRule::Expression { formula } => {
                    let to_err = |source| ScoringError::Formula {
                        credential_type: credential_type.to_string(),
                        source,
                    };
                    let parsed = Formula::parse_with_budget(formula, &policy.budget).map_err(to_err)?;
                    parsed.probe(&policy.budget).map_err(to_err)?;
                    debug!(
                        credential_type = %credential_type,
                        formula = %formula,
                        cost = parsed.cost(),
                        "compiled credential formula"
                    );
                    CompiledRule::Expression(parsed)
                }
            };
            rules.insert(
                *credential_type,
                Compiled {
                    weight: rule.weight,
                    rule: compiled,
                },
            );
        }
        Ok(Self {
            rules,
            max_baseline: policy.max_baseline,
            require_verified: policy.require_verified,
            budget: policy.budget,
        })
    }

    /// Baseline credential score in `[0, max_baseline]`.
    pub fn score(&self, credentials: &[Credential]) -> f64 {
        let total: f64 = credentials.iter().map(|c| self.term(c)).sum();
        if !total.is_finite() {
            warn!(total, "credential sum not finite, using 0");
            return 0.0;
        }
        total.clamp(0.0, self.max_baseline)
    }

    /// Weighted contribution of a single credential.
    pub fn term(&self, credential: &Credential) -> f64 {
        let kind = credential.credential_type;
        if self.require_verified && !credential.verified {
            debug!(credential_type = %kind, "skipping unverified credential");
            return 0.0;
        }
        if kind == CredentialType::Unrecognized {
            warn!(value = %credential.value, "unrecognized credential type contributes 0");
            return 0.0;
        }
        let Some(compiled) = self.rules.get(&kind) else {
            warn!(credential_type = %kind, "no scoring rule configured, contributes 0");
            return 0.0;
        };
        let raw = match &compiled.rule {
            CompiledRule::Lookup { table, default } => table
                .get(&normalize(&credential.value))
                .copied()
                .unwrap_or(*default),
            CompiledRule::Expression(formula) => {
                let Ok(x) = credential.value.trim().parse::<f64>() else {
                    warn!(
                        credential_type = %kind,
                        value = %credential.value,
                        "credential value is not numeric, contributes 0"
                    );
                    return 0.0;
                };
                match formula.evaluate(x, &self.budget) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(
                            credential_type = %kind,
                            formula = %formula.source(),
                            error = %e,
                            "credential term aborted, contributes 0"
                        );
                        return 0.0;
                    }
                }
            }
        };
        compiled.weight * raw
    }

    pub fn max_baseline(&self) -> f64 {
        self.max_baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(rules: Vec<(CredentialType, CredentialRule)>) -> CredentialPolicy {
        CredentialPolicy {
            rules: rules.into_iter().collect(),
            ..CredentialPolicy::default()
        }
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    #[test]
    fn test_default_policy_compiles() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        assert_eq!(scorer.max_baseline(), 2.0);
    }

    #[test]
    fn test_unsafe_formula_rejected_at_load() {
        let policy = policy_with(vec![(
            CredentialType::Publications,
            CredentialRule::expression(0.5, "exec(x)"),
        )]);
        assert!(matches!(
            CredentialScorer::compile(&policy),
            Err(ScoringError::Formula { credential_type, .. }) if credential_type == "publications"
        ));
    }

    #[test]
    fn test_expensive_formula_rejected_at_load() {
        let mut policy = policy_with(vec![(
            CredentialType::YearsExperience,
            CredentialRule::expression(0.5, "sqrt(sqrt(sqrt(x)))"),
        )]);
        policy.budget = EvalBudget::new(10, 5_000);
        let err = CredentialScorer::compile(&policy).unwrap_err();
        assert!(matches!(err, ScoringError::Formula { ref source, .. } if source.is_budget_overrun()));
    }

    #[test]
    fn test_invalid_structure_rejected() {
        let policy = policy_with(vec![(
            CredentialType::Certification,
            CredentialRule::lookup(-1.0, &[], 0.0),
        )]);
        assert!(matches!(
            CredentialScorer::compile(&policy),
            Err(ScoringError::InvalidRule { .. })
        ));

        let mut policy = CredentialPolicy::default();
        policy.max_baseline = 3.0;
        assert!(policy.validate().is_err());
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    #[test]
    fn test_lookup_is_case_insensitive() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        let phd = scorer.score(&[Credential::verified(CredentialType::AcademicDegree, " PhD ")]);
        assert!((phd - 0.5).abs() < 1e-12);
        let other = scorer.score(&[Credential::verified(CredentialType::AcademicDegree, "diploma")]);
        assert!((other - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_expression_rule() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        let ten = scorer.score(&[Credential::verified(CredentialType::YearsExperience, "10")]);
        assert!((ten - 0.2).abs() < 1e-12);
        let forty = scorer.score(&[Credential::verified(CredentialType::YearsExperience, "40")]);
        assert!((forty - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_unverified_contributes_zero() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        let c = Credential::new(CredentialType::AcademicDegree, "phd", false);
        assert_eq!(scorer.score(&[c.clone()]), 0.0);

        let mut policy = CredentialPolicy::default();
        policy.require_verified = false;
        let lenient = CredentialScorer::compile(&policy).unwrap();
        assert!(lenient.score(&[c]) > 0.0);
    }

    #[test]
    fn test_unknown_type_contributes_zero() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        let c: Credential =
            serde_json::from_str(r#"{"type": "astrology_badge", "value": "gold", "verified": true}"#)
                .unwrap();
        assert_eq!(c.credential_type, CredentialType::Unrecognized);
        let degree = Credential::verified(CredentialType::AcademicDegree, "phd");
        assert_eq!(scorer.score(&[c, degree.clone()]), scorer.score(&[degree]));
    }

    #[test]
    fn test_unconfigured_and_non_numeric_contribute_zero() {
        let scorer = CredentialScorer::compile(&policy_with(vec![(
            CredentialType::Publications,
            CredentialRule::expression(1.0, "x"),
        )]))
        .unwrap();
        assert_eq!(
            scorer.score(&[Credential::verified(CredentialType::Certification, "x")]),
            0.0
        );
        assert_eq!(
            scorer.score(&[Credential::verified(CredentialType::Publications, "many")]),
            0.0
        );
    }

    #[test]
    fn test_non_finite_term_contributes_zero() {
        let scorer = CredentialScorer::compile(&policy_with(vec![(
            CredentialType::Publications,
            CredentialRule::expression(1.0, "ln(x)"),
        )]))
        .unwrap();
        assert_eq!(
            scorer.score(&[Credential::verified(CredentialType::Publications, "0")]),
            0.0
        );
    }

    #[test]
    fn test_timed_out_term_contributes_zero() {
        let mut scorer = CredentialScorer::compile(&policy_with(vec![
            (
                CredentialType::Publications,
                CredentialRule::expression(0.5, "min(1, sqrt(x) / 10)"),
            ),
            (
                CredentialType::AcademicDegree,
                CredentialRule::lookup(0.5, &[("phd", 1.0)], 0.1),
            ),
        ]))
        .unwrap();
        let publications = Credential::verified(CredentialType::Publications, "49");
        let degree = Credential::verified(CredentialType::AcademicDegree, "phd");
        assert!((scorer.term(&publications) - 0.35).abs() < 1e-12);

        // A deadline that is already reached when evaluation starts.
        scorer.budget = EvalBudget::new(10_000, 0);
        assert_eq!(scorer.term(&publications), 0.0);
        assert!((scorer.term(&degree) - 0.5).abs() < 1e-12);
        assert!((scorer.score(&[publications, degree]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_capped() {
        let scorer = CredentialScorer::compile(&policy_with(vec![(
            CredentialType::PeerEndorsement,
            CredentialRule::expression(1.0, "x"),
        )]))
        .unwrap();
        let many = Credential::verified(CredentialType::PeerEndorsement, "50");
        assert_eq!(scorer.score(&[many]), 2.0);
        let negative = Credential::verified(CredentialType::PeerEndorsement, "-5");
        assert_eq!(scorer.score(&[negative]), 0.0);
    }

    #[test]
    fn test_same_type_credentials_are_summed() {
        let scorer = CredentialScorer::compile(&CredentialPolicy::default()).unwrap();
        let one = Credential::verified(CredentialType::Certification, "cissp");
        let single = scorer.score(&[one.clone()]);
        let double = scorer.score(&[one.clone(), one]);
        assert!((double - 2.0 * single).abs() < 1e-12);
    }

    #[test]
    fn test_policy_json_shape() {
        let json = r#"{
            "rules": {
                "years_experience": {"weight": 0.5, "rule": {"kind": "expression", "formula": "min(1, x / 10)"}},
                "academic_degree": {"weight": 0.5, "rule": {"kind": "lookup", "table": {"PhD": 1.0}, "default": 0.2}}
            },
            "max_baseline": 1.5
        }"#;
        let policy: CredentialPolicy = serde_json::from_str(json).unwrap();
        assert!(policy.require_verified);
        assert_eq!(policy.rules.len(), 2);
        let scorer = CredentialScorer::compile(&policy).unwrap();
        let s = scorer.score(&[
            Credential::verified(CredentialType::AcademicDegree, "phd"),
            Credential::verified(CredentialType::YearsExperience, "5"),
        ]);
        assert!((s - 0.75).abs() < 1e-12);
    }
}
