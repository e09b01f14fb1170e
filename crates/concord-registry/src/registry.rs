//! # Task-Type Registry
//!
//! Every task type registers one [`TaskTypeDefinition`]: the schemas of its
//! input and feedback payloads, the input fields withheld as ground truth
//! until aggregation, the equality rule used to cluster feedback into
//! positions, the consistency rule used to score each submission, and the
//! critical prompts handed to devil's advocates.
//!
//! Aggregation, track-record updates and bias analysis only ever talk to a
//! definition through this record, so adding a task type is a registry
//! entry and nothing else.
//!
//! ```rust
//! use concord_registry::TaskTypeRegistry;
//! use serde_json::json;
//!
//! let registry = TaskTypeRegistry::with_builtins();
//! let classification = registry.get("classification").unwrap();
//!
//! let key = classification.position_key(&json!({"label": "Spam "})).unwrap();
//! assert_eq!(key.as_str(), "spam");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::canonicalize::hash_canonical;
use crate::models::{DataSchema, FieldKind, FieldSpec, Hash, PositionKey, RegistryError, Result};
use crate::rules::{ConsistencyRule, EqualityRule};

/// Default payload field carrying an evaluator's free-text reasoning.
pub const DEFAULT_REASONING_FIELD: &str = "reasoning";

/// Everything the engine needs to know about one task type.
#[derive(Debug, Clone)]
pub struct TaskTypeDefinition {
    /// Registry lookup key.
    pub tag: String,
    /// Human-readable summary.
    pub description: String,
    /// Schema of the task input (including ground-truth fields).
    pub input_schema: DataSchema,
    /// Schema of a feedback payload.
    pub feedback_schema: DataSchema,
    /// Input fields hidden from evaluators until the task is aggregated.
    pub ground_truth_fields: Vec<String>,
    /// Clustering rule.
    pub equality: EqualityRule,
    /// Per-submission quality rule.
    pub consistency: ConsistencyRule,
    /// Feedback field holding free-text reasoning.
    pub reasoning_field: String,
    /// Prompts handed to devil's advocates for this task type.
    pub critical_prompts: Vec<String>,
}

impl TaskTypeDefinition {
    /// Creates a definition with empty schemas and no ground truth.
    pub fn new(
        tag: impl Into<String>,
        equality: EqualityRule,
        consistency: ConsistencyRule,
    ) -> Self {
        Self {
            tag: tag.into(),
            description: String::new(),
            input_schema: DataSchema::default(),
            feedback_schema: DataSchema::default(),
            ground_truth_fields: Vec::new(),
            equality,
            consistency,
            reasoning_field: DEFAULT_REASONING_FIELD.to_string(),
            critical_prompts: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input_schema(mut self, schema: DataSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_feedback_schema(mut self, schema: DataSchema) -> Self {
        self.feedback_schema = schema;
        self
    }

    pub fn with_ground_truth(mut self, fields: Vec<String>) -> Self {
        self.ground_truth_fields = fields;
        self
    }

    pub fn with_reasoning_field(mut self, field: impl Into<String>) -> Self {
        self.reasoning_field = field.into();
        self
    }

    pub fn with_critical_prompts(mut self, prompts: Vec<String>) -> Self {
        self.critical_prompts = prompts;
        self
    }

    /// Checks that the definition is internally consistent.
    ///
    /// Ground-truth fields and equality fields must be declared in their
    /// schemas whenever those schemas declare any field at all.
    pub fn check(&self) -> Result<()> {
        let invalid = |reason: String| RegistryError::InvalidDefinition {
            tag: self.tag.clone(),
            reason,
        };

        if self.tag.trim().is_empty() {
            return Err(invalid("tag must not be empty".to_string()));
        }
        if !self.input_schema.fields.is_empty() {
            if let Some(f) = self
                .ground_truth_fields
                .iter()
                .find(|f| self.input_schema.field(f).is_none())
            {
                return Err(invalid(format!("ground-truth field '{}' is not in the input schema", f)));
            }
        }
        if !self.feedback_schema.fields.is_empty() {
            if let Some(f) = self
                .equality
                .fields()
                .into_iter()
                .find(|f| self.feedback_schema.field(f).is_none())
            {
                return Err(invalid(format!("equality field '{}' is not in the feedback schema", f)));
            }
        }
        if let EqualityRule::NumericBucket { width, .. } = &self.equality {
            if !(width.is_finite() && *width > 0.0) {
                return Err(invalid(format!("bucket width must be positive, got {}", width)));
            }
        }
        Ok(())
    }

    pub fn validate_input(&self, input: &Value) -> Result<()> {
        self.input_schema.validate(input)
    }

    pub fn validate_feedback(&self, payload: &Value) -> Result<()> {
        self.feedback_schema.validate(payload)
    }

    /// Splits task input into `(public, ground_truth)`.
    ///
    /// Non-object input carries no ground truth and is returned unchanged.
    pub fn split_ground_truth(&self, input: &Value) -> (Value, Value) {
        let Some(obj) = input.as_object() else {
            return (input.clone(), Value::Object(Map::new()));
        };
        let mut public = Map::new();
        let mut hidden = Map::new();
        for (key, value) in obj {
            if self.ground_truth_fields.iter().any(|f| f == key) {
                hidden.insert(key.clone(), value.clone());
            } else {
                public.insert(key.clone(), value.clone());
            }
        }
        (Value::Object(public), Value::Object(hidden))
    }

    /// Position key of a feedback payload (equality rule, step 1).
    pub fn position_key(&self, payload: &Value) -> Option<PositionKey> {
        self.equality.position_key(payload)
    }

    /// Consistency of a payload with a position payload, in `[0, 1]`.
    pub fn consistency(&self, payload: &Value, position: &Value) -> f64 {
        self.consistency.similarity(&self.equality, payload, position)
    }

    /// The position-defining part of a payload: the equality fields when
    /// known, otherwise the payload minus its reasoning.
    pub fn position_view(&self, payload: &Value) -> Value {
        let fields = self.equality.fields();
        match payload.as_object() {
            Some(obj) if !fields.is_empty() => Value::Object(
                fields
                    .into_iter()
                    .filter_map(|f| obj.get(f).map(|v| (f.to_string(), v.clone())))
                    .collect(),
            ),
            Some(obj) => Value::Object(
                obj.iter()
                    .filter(|(k, _)| **k != self.reasoning_field)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            None => payload.clone(),
        }
    }

    /// Free-text reasoning carried by a payload, if any.
    pub fn reasoning<'a>(&self, payload: &'a Value) -> Option<&'a str> {
        payload
            .get(&self.reasoning_field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Stable digest of the declarative parts of the definition.
    pub fn fingerprint(&self) -> Hash {
        #[derive(Serialize)]
        struct Declared<'a> {
            tag: &'a str,
            input_schema: &'a DataSchema,
            feedback_schema: &'a DataSchema,
            ground_truth_fields: &'a [String],
            equality: String,
            consistency: String,
        }
        let declared = Declared {
            tag: &self.tag,
            input_schema: &self.input_schema,
            feedback_schema: &self.feedback_schema,
            ground_truth_fields: &self.ground_truth_fields,
            equality: format!("{:?}", self.equality),
            consistency: format!("{:?}", self.consistency),
        };
        let value = serde_json::to_value(&declared).unwrap_or(Value::Null);
        hash_canonical(&value)
    }
}

/// Lookup table of task types, keyed by tag.
///
/// Definitions are stored behind `Arc` so callers can hold one across a
/// whole aggregation cycle without borrowing the registry.
#[derive(Debug, Clone, Default)]
pub struct TaskTypeRegistry {
    types: BTreeMap<String, Arc<TaskTypeDefinition>>,
}

impl TaskTypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in task types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for definition in crate::builtin::definitions() {
            registry.types.insert(definition.tag.clone(), Arc::new(definition));
        }
        registry
    }

    /// Registers a new task type.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if the tag is taken, or
    /// [`RegistryError::InvalidDefinition`] if [`TaskTypeDefinition::check`]
    /// fails.
    pub fn register(&mut self, definition: TaskTypeDefinition) -> Result<()> {
        definition.check()?;
        if self.types.contains_key(&definition.tag) {
            return Err(RegistryError::AlreadyRegistered(definition.tag));
        }
        debug!(tag = %definition.tag, "registered task type");
        self.types.insert(definition.tag.clone(), Arc::new(definition));
        Ok(())
    }

    /// Registers or replaces a task type.
    pub fn upsert(&mut self, definition: TaskTypeDefinition) -> Result<()> {
        definition.check()?;
        debug!(tag = %definition.tag, "upserted task type");
        self.types.insert(definition.tag.clone(), Arc::new(definition));
        Ok(())
    }

    /// Resolves a tag.
    pub fn get(&self, tag: &str) -> Result<Arc<TaskTypeDefinition>> {
        self.types
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTaskType(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Shorthand used by the built-in definitions.
pub(crate) fn schema(fields: &[(&str, FieldKind, bool)]) -> DataSchema {
    DataSchema::new(
        fields
            .iter()
            .map(|(name, kind, required)| FieldSpec {
                name: (*name).to_string(),
                kind: *kind,
                required: *required,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict_type() -> TaskTypeDefinition {
        TaskTypeDefinition::new(
            "verdict",
            EqualityRule::Exact {
                fields: vec!["verdict".into()],
            },
            ConsistencyRule::ExactMatch,
        )
        .with_input_schema(schema(&[
            ("claim", FieldKind::String, true),
            ("truth", FieldKind::Boolean, false),
        ]))
        .with_feedback_schema(schema(&[
            ("verdict", FieldKind::Boolean, true),
            ("reasoning", FieldKind::String, false),
        ]))
        .with_ground_truth(vec!["truth".into()])
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = TaskTypeRegistry::new();
        registry.register(verdict_type()).unwrap();
        assert!(registry.contains("verdict"));
        assert_eq!(registry.get("verdict").unwrap().tag, "verdict");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut registry = TaskTypeRegistry::new();
        registry.register(verdict_type()).unwrap();
        assert!(matches!(
            registry.register(verdict_type()),
            Err(RegistryError::AlreadyRegistered(_))
        ));
        assert!(registry.upsert(verdict_type()).is_ok());
    }

    #[test]
    fn test_unknown_task_type() {
        let registry = TaskTypeRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::UnknownTaskType(t)) if t == "missing"
        ));
    }

    #[test]
    fn test_check_rejects_undeclared_ground_truth() {
        let def = verdict_type().with_ground_truth(vec!["secret".into()]);
        assert!(matches!(
            def.check(),
            Err(RegistryError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_check_rejects_undeclared_equality_field() {
        let mut def = verdict_type();
        def.equality = EqualityRule::NormalizedText {
            field: "label".into(),
        };
        assert!(def.check().is_err());
    }

    #[test]
    fn test_split_ground_truth() {
        let def = verdict_type();
        let (public, hidden) = def.split_ground_truth(&json!({"claim": "water is wet", "truth": true}));
        assert_eq!(public, json!({"claim": "water is wet"}));
        assert_eq!(hidden, json!({"truth": true}));
    }

    #[test]
    fn test_reasoning_extraction() {
        let def = verdict_type();
        assert_eq!(
            def.reasoning(&json!({"verdict": true, "reasoning": "  obvious  "})),
            Some("obvious")
        );
        assert_eq!(def.reasoning(&json!({"verdict": true, "reasoning": "   "})), None);
        assert_eq!(def.reasoning(&json!({"verdict": true})), None);
    }

    #[test]
    fn test_position_view_keeps_equality_fields() {
        let def = verdict_type();
        assert_eq!(
            def.position_view(&json!({"verdict": false, "reasoning": "no"})),
            json!({"verdict": false})
        );
    }

    #[test]
    fn test_fingerprint_changes_with_rules() {
        let a = verdict_type();
        let mut b = verdict_type();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.consistency = ConsistencyRule::TokenOverlap {
            field: "verdict".into(),
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
