//! # Concord Core
//!
//! Authority-weighted feedback consensus engine.
//! Orchestrates the task-type registry, the scoring components and the
//! feedback council over a pluggable store.
//!
//! ## Task Cycle
//!
//! | Step | Operation | Effect |
//! |------|-----------|--------|
//! | Create | [`ConsensusEngine::create_task`] | `OPEN`, ground truth split off |
//! | Advocates | [`ConsensusEngine::assign_advocates`] | critical reviewers drawn |
//! | Collect | [`ConsensusEngine::capture_feedback`] | `BLIND_EVALUATION`, authority snapshot |
//! | Aggregate | [`ConsensusEngine::process_task`] | result + bias report, `AGGREGATED`, scores updated |
//! | Review | [`ConsensusEngine::score_advocate`] | advocate effectiveness stored |
//! | Close | [`ConsensusEngine::close_task`] | `CLOSED` |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       CONCORD CORE                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   LiveConfig ──► ConfigSnapshot (compiled, versioned)           │
//! │                         │                                       │
//! │                  ┌──────┴──────────┐                            │
//! │                  │ ConsensusEngine │  ← Unified Facade          │
//! │                  └──────┬──────────┘                            │
//! │         ┌───────────────┼───────────────────┐                   │
//! │         ▼               ▼                   ▼                   │
//! │  ┌─────────────┐ ┌─────────────┐    ┌─────────────┐             │
//! │  │  Task-Type  │ │   Scoring   │    │   Council   │             │
//! │  │  Registry   │ │ (authority) │    │ (consensus) │             │
//! │  └─────────────┘ └─────────────┘    └─────────────┘             │
//! │                         │                                       │
//! │                         ▼                                       │
//! │                   ScoreStore (trait)                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Aggregation reads authority snapshots taken at submission time and a
//!   canonical feedback order, so the same feedback set always yields the
//!   same result
//! - At most one aggregation per task runs at a time
//! - Score writes are serialized per user
//! - Invalid configuration reloads are rejected and the active snapshot
//!   stays in place
//! - An empty feedback set persists nothing

mod config;
mod engine;
mod error;
mod live_config;
mod locks;
mod model;
mod store;

pub use config::EngineConfig;
pub use engine::{ConsensusEngine, ProcessReport};
pub use error::CoreError;
pub use live_config::{ConfigSnapshot, LiveConfig};
pub use locks::{InFlight, InFlightGuard, KeyedLocks};
pub use model::{
    AggregationRecord, PublicTaskView, ScoreUpdate, Task, TaskStatus, User, UserScores,
    INITIAL_TRACK_RECORD,
};
pub use store::{MemoryStore, ScoreStore};

// Re-export component types for convenience
pub use concord_council::{
    AdvocateAssignment, AggregationResult, AlternativePosition, BiasLevel, BiasReport,
    EffectivenessReport, EvaluatorProfile, Feedback,
};
pub use concord_registry::{TaskTypeDefinition, TaskTypeRegistry};
pub use concord_scoring::{Credential, CredentialType};

/// Core result type for engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests;
