//! Hot-reloadable configuration.
//!
//! A [`ConfigSnapshot`] is an [`EngineConfig`] together with every component
//! compiled from it. Snapshots are immutable; a reload compiles a complete
//! candidate first and only swaps the shared pointer once every invariant
//! holds. A rejected candidate leaves the active snapshot untouched.
//!
//! ```text
//!   candidate EngineConfig
//!          │ validate()        ── fail ──► CoreError::Config, old snapshot stays
//!          ▼
//!   compile scorers / probe formulas ── fail ──► same
//!          │
//!          ▼
//!   RwLock<Arc<ConfigSnapshot>>  ◄── swap (version + 1)
//! ```
//!
//! Readers clone the `Arc` and work on that snapshot for the rest of their
//! operation, so one aggregation never mixes two configurations.

use std::sync::{Arc, PoisonError, RwLock};

use concord_council::{AdvocateAssigner, BiasAnalyzer, ConsensusAggregator};
use concord_scoring::{AuthorityScorer, CredentialScorer, TrackRecordUpdater};
use tracing::{info, warn};

use crate::{config::EngineConfig, CoreError, Result};

/// One immutable, fully compiled configuration.
#[derive(Debug)]
pub struct ConfigSnapshot {
    version: u64,
    config: EngineConfig,
    pub credentials: CredentialScorer,
    pub authority: AuthorityScorer,
    pub track_record: TrackRecordUpdater,
    pub aggregator: ConsensusAggregator,
    pub bias: BiasAnalyzer,
    pub advocate: AdvocateAssigner,
}

impl ConfigSnapshot {
    /// Validates and compiles `config`.
    ///
    /// # Errors
    ///
    /// The first violated invariant, wrapped as [`CoreError::Config`]:
    /// weight sums and caps, smoothing range, thresholds, credential rules,
    /// and any formula that fails to parse or overruns its budget on probe.
    pub fn compile(config: EngineConfig, version: u64) -> Result<Self> {
        let rejected = |e: CoreError| CoreError::Config(e.to_string());
        config.validate().map_err(rejected)?;

        let credentials =
            CredentialScorer::compile(&config.credentials).map_err(|e| rejected(e.into()))?;
        let authority = AuthorityScorer::new(&config.authority).map_err(|e| rejected(e.into()))?;
        let track_record =
            TrackRecordUpdater::new(&config.track_record).map_err(|e| rejected(e.into()))?;
        let aggregator = ConsensusAggregator::new(config.consensus).map_err(|e| rejected(e.into()))?;
        let bias = BiasAnalyzer::new(config.bias.clone()).map_err(|e| rejected(e.into()))?;
        let advocate =
            AdvocateAssigner::new(config.advocate.clone()).map_err(|e| rejected(e.into()))?;

        Ok(Self {
            version,
            config,
            credentials,
            authority,
            track_record,
            aggregator,
            bias,
            advocate,
        })
    }

    /// Monotonically increasing; the initial snapshot is version 1.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// The currently active [`ConfigSnapshot`], swappable at runtime.
#[derive(Debug)]
pub struct LiveConfig {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl LiveConfig {
    /// Compiles the initial snapshot.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let snapshot = ConfigSnapshot::compile(config, 1)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Replaces the active snapshot with one compiled from `candidate`.
    ///
    /// Returns the new version. On error nothing changes.
    pub fn reload(&self, candidate: EngineConfig) -> Result<u64> {
        // Hold the write lock across compilation so concurrent reloads get
        // distinct, ordered versions.
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = guard.version() + 1;
        match ConfigSnapshot::compile(candidate, next) {
            Ok(snapshot) => {
                *guard = Arc::new(snapshot);
                info!(version = next, "configuration reloaded");
                Ok(next)
            }
            Err(e) => {
                warn!(active = guard.version(), error = %e, "configuration reload rejected");
                Err(e)
            }
        }
    }
}
