//! # Core Data Models for the Task-Type Registry
//!
//! Field schemas for task input and feedback payloads, the position key
//! used to cluster feedback, and the registry error type.
//!
//! Schemas here are deliberately flat: a payload is a JSON object whose
//! top-level fields are declared with a [`FieldKind`] and a required flag.
//! Nested structure is allowed through [`FieldKind::Array`],
//! [`FieldKind::Object`] and [`FieldKind::Any`] but is not inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// SHA-256 digest size in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; HASH_SIZE];

/// Renders a digest as lowercase hex.
pub fn hash_hex(hash: &Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// JSON type accepted for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value, including null.
    Any,
}

impl FieldKind {
    /// Returns true if `value` is of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// A single declared field in a [`DataSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Top-level key in the payload object.
    pub name: String,
    /// Accepted JSON type.
    pub kind: FieldKind,
    /// Whether the field must be present (and non-null).
    pub required: bool,
}

impl FieldSpec {
    /// A required field.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// An optional field.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Schema for task input data or feedback payloads.
///
/// # Example
///
/// ```rust
/// use concord_registry::{DataSchema, FieldKind, FieldSpec};
/// use serde_json::json;
///
/// let schema = DataSchema::new(vec![
///     FieldSpec::required("label", FieldKind::String),
///     FieldSpec::optional("reasoning", FieldKind::String),
/// ]);
///
/// assert!(schema.validate(&json!({"label": "spam"})).is_ok());
/// assert!(schema.validate(&json!({"reasoning": "no label"})).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSchema {
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Whether undeclared fields are tolerated.
    pub allow_additional: bool,
}

impl DataSchema {
    /// Creates a schema that tolerates undeclared fields.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            allow_additional: true,
        }
    }

    /// Rejects payloads carrying undeclared fields.
    pub fn strict(mut self) -> Self {
        self.allow_additional = false;
        self
    }

    /// Looks up a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates a payload against this schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SchemaViolation`] naming the first offending
    /// field: a missing required field, a type mismatch, or an undeclared
    /// field when the schema is strict.
    pub fn validate(&self, payload: &Value) -> Result<()> {
        let obj = payload.as_object().ok_or_else(|| RegistryError::SchemaViolation {
            field: "<root>".to_string(),
            reason: "payload must be a JSON object".to_string(),
        })?;

        for spec in &self.fields {
            match obj.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(RegistryError::SchemaViolation {
                        field: spec.name.clone(),
                        reason: "required field is missing".to_string(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    return Err(RegistryError::SchemaViolation {
                        field: spec.name.clone(),
                        reason: format!("expected {}", spec.kind),
                    });
                }
                Some(_) => {}
            }
        }

        if !self.allow_additional {
            if let Some(extra) = obj.keys().find(|k| self.field(k).is_none()) {
                return Err(RegistryError::SchemaViolation {
                    field: extra.clone(),
                    reason: "field is not declared".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Canonical identity of a feedback position.
///
/// Two feedback items belong to the same position exactly when their keys
/// are equal. Keys order lexicographically, which gives aggregation a
/// deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(pub String);

impl PositionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No task type is registered under this tag.
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// A task type with this tag already exists.
    #[error("Task type already registered: {0}")]
    AlreadyRegistered(String),

    /// A payload did not match its schema.
    #[error("Schema violation on field '{field}': {reason}")]
    SchemaViolation {
        /// Offending field name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A task-type definition is internally inconsistent.
    #[error("Invalid task type definition '{tag}': {reason}")]
    InvalidDefinition {
        /// Tag of the rejected definition.
        tag: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
