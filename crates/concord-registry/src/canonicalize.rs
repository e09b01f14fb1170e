//! # Canonical JSON
//!
//! Deterministic JSON serialization following RFC 8785 (JCS) closely enough
//! for identity purposes: object keys sorted by UTF-16 code units, no
//! insignificant whitespace, minimal string escaping, and integral floats
//! written without a fractional part.
//!
//! Canonical text is used in two places:
//!
//! - position keys for [`EqualityRule::Exact`](crate::EqualityRule::Exact),
//!   so that `{"a":1,"b":2}` and `{"b":2,"a":1}` cluster together;
//! - result fingerprints, so two aggregations of the same feedback set can
//!   be compared byte for byte.
//!
//! ```rust
//! use concord_registry::canonicalize::canonicalize;
//! use serde_json::json;
//!
//! assert_eq!(canonicalize(&json!({"b": 1.0, "a": [true, null]})), r#"{"a":[true,null],"b":1}"#);
//! ```
//!
//! ## References
//!
//! - RFC 8785, "JSON Canonicalization Scheme (JCS)"
//!   <https://www.rfc-editor.org/rfc/rfc8785>

use crate::models::Hash;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Returns the canonical text of a JSON value.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// SHA-256 over the canonical text of a JSON value.
pub fn hash_canonical(value: &Value) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(value).as_bytes());
    hasher.finalize().into()
}

/// SHA-256 over the canonical form of any serializable record.
///
/// # Errors
///
/// Fails only if `record` cannot be represented as JSON (for example a map
/// with non-string keys).
pub fn fingerprint<T: Serialize>(record: &T) -> crate::Result<Hash> {
    let value = serde_json::to_value(record)?;
    Ok(hash_canonical(&value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &serde_json::Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
    } else {
        match n.as_f64() {
            Some(f) if !f.is_finite() => out.push_str("null"),
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                let _ = write!(out, "{}", f as i64);
            }
            Some(f) => {
                let _ = write!(out, "{}", f);
            }
            None => {
                let _ = write!(out, "{}", n);
            }
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
