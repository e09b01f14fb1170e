//! Engine configuration.
//!
//! Every section has a `Default` matching the documented defaults, and the
//! whole tree round-trips through JSON. Missing sections or fields fall back
//! to their defaults, so a config file only needs to name what it changes.
//!
//! ```json
//! {
//!   "authority": { "weights": { "baseline": 0.3, "track_record": 0.5, "recent_performance": 0.2 } },
//!   "consensus": { "disagreement_threshold": 0.35 }
//! }
//! ```

use concord_council::{AdvocateConfig, AggregatorConfig, BiasConfig};
use concord_scoring::{AuthorityConfig, CredentialPolicy, TrackRecordConfig};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Configuration for the consensus engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Authority weights α, β, γ and their guardrail caps.
    pub authority: AuthorityConfig,

    /// Track-record smoothing factor λ.
    pub track_record: TrackRecordConfig,

    /// Disagreement thresholds and alternative support cutoff.
    pub consensus: AggregatorConfig,

    /// Per credential type weight and scoring rule.
    pub credentials: CredentialPolicy,

    /// Bias level thresholds and per-dimension alert thresholds.
    pub bias: BiasConfig,

    /// Devil's-advocate eligibility and probability cap.
    pub advocate: AdvocateConfig,
}

impl EngineConfig {
    /// Parses a JSON configuration document.
    ///
    /// Parsing does not validate; see [`EngineConfig::validate`].
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Config(format!("invalid JSON: {}", e)))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Checks every structural invariant of every section.
    ///
    /// Credential formulas are only parsed here; probing them under the
    /// evaluation budget happens when a snapshot is compiled.
    pub fn validate(&self) -> Result<()> {
        self.authority.validate()?;
        self.track_record.validate()?;
        self.credentials.validate()?;
        self.consensus.validate()?;
        self.bias.validate()?;
        self.advocate.validate()?;
        Ok(())
    }
}
