//! PropertyMap — the key-value store on nodes and relationships.

use super::Value;
use crate::{Error, Result};

/// A map of property names to values. Also the parameter map for queries.
pub type PropertyMap = hashbrown::HashMap<String, Value>;

/// Parse a JSON object into a parameter map.
///
/// Convenience for embedders that receive parameters over a JSON boundary.
pub fn params_from_json(json: &str) -> Result<PropertyMap> {
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| Error::TypeError { expected: "JSON object".into(), got: e.to_string() })?;
    match parsed {
        serde_json::Value::Object(m) => {
            Ok(m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
        }
        other => Err(Error::TypeError {
            expected: "JSON object".into(),
            got: format!("{other}"),
        }),
    }
}

/// Validate that a value is storable as a property: a scalar or a flat list
/// of scalars. Nested maps are a design error at the write boundary.
pub fn validate_property(key_path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => Ok(()),
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_)
                    | Value::String(_) => {}
                    _ => {
                        return Err(Error::InvalidProperty {
                            path: format!("{key_path}[{i}]"),
                        });
                    }
                }
            }
            Ok(())
        }
        Value::Map(m) => {
            let offending = m.keys().next().cloned().unwrap_or_default();
            Err(Error::InvalidProperty { path: format!("{key_path}.{offending}") })
        }
        _ => Err(Error::InvalidProperty { path: key_path.to_owned() }),
    }
}
