//! Config schema declared by `@field` lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Declared field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Single-line string.
    String,
    /// Boolean switch.
    Boolean,
    /// Number.
    Number,
    /// One of `options`.
    Select,
    /// Multi-line string.
    Text,
}

impl FieldType {
    /// Parses the name used inside `{..}`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "boolean" | "bool" => Some(Self::Boolean),
            "number" => Some(Self::Number),
            "select" => Some(Self::Select),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Select => "select",
            Self::Text => "text",
        }
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// `string` and `text` fields.
    String(String),
    /// `boolean` fields.
    Bool(bool),
    /// `number` fields.
    Number(f64),
    /// `select` fields; always one of the declared options.
    Enum(String),
}

impl ConfigValue {
    /// JSON form used for persistence and the API.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) | Self::Enum(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
        }
    }

    /// String content of `String` and `Enum` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric content.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One `@field` declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigFieldDescriptor {
    /// Field key, unique within the schema.
    pub key: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Display label.
    pub label: String,
    /// Description or placeholder.
    pub description: String,
    /// Typed default.
    pub default_value: Option<ConfigValue>,
    /// Whether the field may be absent.
    pub optional: bool,
    /// Allowed values of a `select`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ConfigFieldDescriptor {
    /// Required fields must be submitted unless they carry a default.
    pub fn is_required(&self) -> bool {
        !self.optional
    }
}

/// Ordered list of a plugin's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: Vec<ConfigFieldDescriptor>,
}

impl ConfigSchema {
    /// Builds a schema; the caller guarantees unique keys.
    pub fn new(fields: Vec<ConfigFieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[ConfigFieldDescriptor] {
        &self.fields
    }

    /// Looks a field up by key.
    pub fn field(&self, key: &str) -> Option<&ConfigFieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Whether no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every declared default.
    pub fn defaults(&self) -> BTreeMap<String, ConfigValue> {
        self.fields
            .iter()
            .filter_map(|f| f.default_value.clone().map(|v| (f.key.clone(), v)))
            .collect()
    }
}

/// A plugin's effective configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginConfig {
    /// Owning plugin.
    pub plugin_name: String,
    /// Field key to value.
    pub values: BTreeMap<String, ConfigValue>,
    /// Last persisted write, `None` when only defaults apply.
    pub updated_at: Option<DateTime<Utc>>,
}

impl PluginConfig {
    /// Returns a value.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Returns a string or select value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    /// Returns a boolean value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    /// Returns a numeric value.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ConfigValue::as_f64)
    }

    /// Returns a numeric value truncated to an integer.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_f64(key).map(|n| n as i64)
    }

    /// JSON object of every value.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}
