//! # Concord Task-Type Registry
//!
//! Pluggable per-task-type rules consumed by aggregation, track-record
//! updates and bias analysis.
//!
//! ## Purpose
//!
//! A task type decides three things the rest of the engine must not hard-code:
//!
//! 1. **Shape** - schemas for task input and feedback payloads, and which
//!    input fields are ground truth withheld from evaluators.
//! 2. **Equality** - when two feedback payloads express the same position.
//! 3. **Consistency** - how close a payload is to an emitted answer, which
//!    becomes the submitter's quality signal for the cycle.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │   TaskTypeRegistry   │  tag → Arc<TaskTypeDefinition>
//!                 └──────────┬───────────┘
//!                            │
//!        ┌───────────────────┼────────────────────┐
//!        ▼                   ▼                    ▼
//!  ┌────────────┐     ┌─────────────┐     ┌───────────────┐
//!  │ DataSchema │     │EqualityRule │     │ConsistencyRule│
//!  │ input/fb   │     │ → PositionKey│    │ → [0, 1]      │
//!  └────────────┘     └──────┬──────┘     └───────────────┘
//!                            │
//!                     ┌──────▼──────┐
//!                     │ canonicalize│  RFC 8785 JSON + SHA-256
//!                     └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use concord_registry::{
//!     ConsistencyRule, DataSchema, EqualityRule, FieldKind, FieldSpec,
//!     TaskTypeDefinition, TaskTypeRegistry,
//! };
//! use serde_json::json;
//!
//! let mut registry = TaskTypeRegistry::with_builtins();
//! registry
//!     .register(
//!         TaskTypeDefinition::new(
//!             "fact_check",
//!             EqualityRule::Exact { fields: vec!["verdict".into()] },
//!             ConsistencyRule::ExactMatch,
//!         )
//!         .with_feedback_schema(DataSchema::new(vec![
//!             FieldSpec::required("verdict", FieldKind::Boolean),
//!         ])),
//!     )
//!     .unwrap();
//!
//! let fact_check = registry.get("fact_check").unwrap();
//! assert!(fact_check.validate_feedback(&json!({"verdict": true})).is_ok());
//! ```
//!
//! ## References
//!
//! - RFC 8785, "JSON Canonicalization Scheme (JCS)"
//! - Jaccard, P. (1912). "The distribution of the flora in the alpine zone"

pub mod builtin;
pub mod canonicalize;
pub mod models;
pub mod registry;
pub mod rules;

pub use models::{
    hash_hex, DataSchema, FieldKind, FieldSpec, Hash, PositionKey, RegistryError, Result,
};
pub use registry::{TaskTypeDefinition, TaskTypeRegistry, DEFAULT_REASONING_FIELD};
pub use rules::{ConsistencyRule, EqualityRule, KeyFn, SimilarityFn};
