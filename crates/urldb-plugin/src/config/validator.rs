//! Schema-driven validation of submitted config objects.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use super::schema::{ConfigFieldDescriptor, ConfigSchema, ConfigValue, FieldType};
use crate::error::{FieldError, ValidationError};

/// Validates a full submission against `schema`.
///
/// Unknown keys are rejected. A missing or `null` field takes its default;
/// a required field without default is an error. Every problem is reported.
pub fn validate(
    plugin: &str,
    schema: &ConfigSchema,
    submitted: &Map<String, Value>,
) -> Result<BTreeMap<String, ConfigValue>, ValidationError> {
    let mut errors = Vec::new();
    let mut values = BTreeMap::new();

    for field in schema.fields() {
        match submitted.get(&field.key) {
            None | Some(Value::Null) => match &field.default_value {
                Some(default) => {
                    values.insert(field.key.clone(), default.clone());
                }
                None if field.is_required() => {
                    errors.push(FieldError::new(&field.key, "required field is missing"));
                }
                None => {}
            },
            Some(value) => match convert(field, value) {
                Ok(converted) => {
                    values.insert(field.key.clone(), converted);
                }
                Err(message) => errors.push(FieldError::new(&field.key, message)),
            },
        }
    }

    for key in submitted.keys() {
        if schema.field(key).is_none() {
            errors.push(FieldError::new(key, "unknown field"));
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(ValidationError {
            plugin: plugin.to_string(),
            errors,
        })
    }
}

/// Reads persisted values leniently and merges them over schema defaults.
///
/// Keys no longer in the schema and values that no longer fit their field
/// type are dropped, so the field falls back to its default.
pub fn merge_stored(
    plugin: &str,
    schema: &ConfigSchema,
    stored: &Map<String, Value>,
) -> BTreeMap<String, ConfigValue> {
    let mut values = schema.defaults();
    for (key, raw) in stored {
        let Some(field) = schema.field(key) else {
            continue;
        };
        match convert(field, raw) {
            Ok(value) => {
                values.insert(key.clone(), value);
            }
            Err(reason) => {
                warn!(plugin = %plugin, field = %key, reason = %reason, "Ignoring stored config value");
            }
        }
    }
    values
}

fn convert(field: &ConfigFieldDescriptor, value: &Value) -> Result<ConfigValue, String> {
    match field.field_type {
        FieldType::String | FieldType::Text => value
            .as_str()
            .map(|s| ConfigValue::String(s.to_string()))
            .ok_or_else(|| "expected a string".to_string()),
        FieldType::Boolean => value
            .as_bool()
            .map(ConfigValue::Bool)
            .ok_or_else(|| "expected a boolean".to_string()),
        FieldType::Number => value
            .as_f64()
            .filter(|n| n.is_finite())
            .map(ConfigValue::Number)
            .ok_or_else(|| "expected a number".to_string()),
        FieldType::Select => {
            let choice = value
                .as_str()
                .ok_or_else(|| "expected one of the listed options".to_string())?;
            if field.options.iter().any(|o| o == choice) {
                Ok(ConfigValue::Enum(choice.to_string()))
            } else {
                Err(format!(
                    "'{choice}' is not one of [{}]",
                    field.options.join(", ")
                ))
            }
        }
    }
}
