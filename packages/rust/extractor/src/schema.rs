//! Output contract handed to the extraction engine.
//!
//! The contract is generated from a Rust type with `schemars`, then put into
//! strict form: every object closed with `additionalProperties: false`,
//! every property listed in `required` (optional ones are nullable), all
//! `$ref`s inlined and `default` keywords dropped. The same type validates
//! the engine's answer on the way back.

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde_json::Value;

use lazylist_shared::{LazyListError, Result};

/// Types usable as an extraction contract.
///
/// Blanket-implemented for anything that is `JsonSchema + DeserializeOwned`.
pub trait OutputContract: JsonSchema + DeserializeOwned {
    /// Strict JSON schema for this type.
    fn contract() -> ExtractionSchema {
        ExtractionSchema::of::<Self>()
    }
}

impl<T: JsonSchema + DeserializeOwned> OutputContract for T {}

/// A named JSON schema in strict form.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    name: String,
    schema: Value,
}

impl ExtractionSchema {
    /// Build the strict schema for `T`.
    pub fn of<T: JsonSchema>() -> Self {
        let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_default();

        close_objects(&mut schema);
        inline_refs(&mut schema);
        if let Value::Object(map) = &mut schema {
            map.remove("definitions");
            map.remove("$schema");
        }

        Self {
            name: sanitize_name(&T::schema_name()),
            schema,
        }
    }

    /// Schema name (`[a-zA-Z0-9_-]` only).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Accept `value` only if it deserializes into `T` as a whole.
    pub fn validate<T: DeserializeOwned>(&self, value: Value) -> Result<T> {
        if !value.is_object() {
            return Err(LazyListError::engine(format!(
                "engine returned {} instead of a `{}` object",
                json_kind(&value),
                self.name
            )));
        }
        serde_json::from_value(value).map_err(|e| {
            LazyListError::engine(format!("response does not match schema `{}`: {e}", self.name))
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Close every object schema and mark all of its properties required.
fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("default");

            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".into(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let keys = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".into(), Value::Array(keys));
                }
            }

            for (key, child) in map.iter_mut() {
                // Property names live here, not schemas; a field called
                // `default` must survive.
                if key == "properties" {
                    if let Value::Object(props) = child {
                        props.values_mut().for_each(close_objects);
                    }
                } else {
                    close_objects(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// Replace `#/definitions/...` references with the definitions themselves.
fn inline_refs(value: &mut Value) {
    let Some(definitions) = value.get("definitions").cloned() else {
        return;
    };
    inline_refs_with(value, &definitions);
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut def) = target {
                inline_refs_with(&mut def, definitions);
                *value = def;
                return;
            }
            map.values_mut()
                .for_each(|child| inline_refs_with(child, definitions));
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|child| inline_refs_with(child, definitions)),
        _ => {}
    }
}
