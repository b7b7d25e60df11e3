//! Processing configuration with canonical serialization

use crate::KeyResult;
use serde::Serialize;
use serde_json::Value;
use video_insight_common::AnalysisKind;

/// Opaque, order-independent record of every parameter that affects an
/// analysis output.
///
/// Built from any serializable value; hashed through [`canonical_bytes`],
/// which sorts object keys recursively so that two configs with the same
/// fields always digest identically regardless of insertion order.
///
/// [`canonical_bytes`]: ProcessingConfig::canonical_bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig(Value);

impl ProcessingConfig {
    /// Wrap an already-parsed JSON value
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Serialize any config struct into an opaque processing config
    pub fn from_serialize<T: Serialize>(value: &T) -> KeyResult<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Scope this config to one analysis kind so each kind derives its own
    /// key from the same request-level configuration.
    #[must_use]
    pub fn for_kind(&self, kind: AnalysisKind) -> Self {
        Self(serde_json::json!({
            "kind": kind.name(),
            "params": self.0,
        }))
    }

    /// Canonical byte encoding: JSON with recursively sorted object keys
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        write_canonical(&self.0, &mut out);
        out.into_bytes()
    }

    /// The underlying JSON value
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Write a JSON value with object keys in sorted order.
///
/// Scalars and strings use serde_json's own formatting so numeric output is
/// identical to a normal serialization pass.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail for a plain string
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
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
        scalar => out.push_str(&scalar.to_string()),
    }
}
