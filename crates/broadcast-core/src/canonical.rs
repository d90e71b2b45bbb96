//! Canonical encoding for broadcast values
//!
//! Deduplication compares values by the digest of their canonical bytes:
//! - Object keys are emitted in sorted order, regardless of map backing
//! - No insignificant whitespace
//! - Floats are normalized (-0.0 → +0.0)
//! - Integers and floats stay distinct (`5` != `5.0`)

use crate::types::{Value, ValueId};
use blake3::Hasher;

/// Domain separator for value digests
const VALUE_DOMAIN: &[u8] = b"broadcast-value-v1:";

/// Serialize a value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out.into_bytes()
}

/// Derive the deduplication identifier of a value.
pub fn value_id(value: &Value) -> ValueId {
    let mut hasher = Hasher::new();
    hasher.update(VALUE_DOMAIN);
    hasher.update(&canonical_bytes(value));
    ValueId(*hasher.finalize().as_bytes())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => out.push_str(&value.to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f == 0.0 => out.push_str("0.0"),
            _ => out.push_str(&n.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}
