//! Declarative tool input schemas and the argument validator
//!
//! A schema is an explicit list of fields with a primitive type and a required flag.
//! Validation is all-or-nothing: either every field checks out and a
//! [`ValidatedArguments`] is produced, or the first offending field is reported.

use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<&'static str>,
}

/// What to do with argument fields the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    #[default]
    Reject,
    Ignore,
}

impl FromStr for UnknownFieldPolicy {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "ignore" => Ok(Self::Ignore),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name,
            field_type,
            required: true,
            description: None,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name,
            field_type,
            required: false,
            description: None,
        });
        self
    }

    /// Attaches a description to the most recently declared field.
    pub fn described(mut self, description: &'static str) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.description = Some(description);
        }
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// JSON Schema object advertised to clients in `tools/list`.
    pub fn to_json_schema(&self) -> Value {
        let properties = self
            .fields
            .iter()
            .map(|field| {
                let mut property = Map::new();
                property.insert("type".to_string(), json!(field.field_type.as_str()));
                if let Some(description) = field.description {
                    property.insert("description".to_string(), json!(description));
                }
                (field.name.to_string(), Value::Object(property))
            })
            .collect::<Map<_, _>>();

        let required = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
            .collect::<Vec<_>>();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(field, "is required")
    }

    pub fn wrong_type(field: &str, expected: FieldType, actual: &Value) -> Self {
        Self::new(
            field,
            format!("must be of type {expected}, got {}", json_type_name(actual)),
        )
    }

    pub fn unknown(field: &str) -> Self {
        Self::new(field, "is not accepted by this tool")
    }
}

/// Arguments that passed validation. Only declared fields survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArguments(Map<String, Value>);

impl ValidatedArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserializes into a handler-specific argument struct.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, SchemaError> {
        serde_json::from_value(Value::Object(self.0))
            .map_err(|err| SchemaError::new("arguments", err.to_string()))
    }
}

pub fn validate(
    schema: &InputSchema,
    arguments: &Map<String, Value>,
    policy: UnknownFieldPolicy,
) -> Result<ValidatedArguments, SchemaError> {
    let mut accepted = Map::new();

    for field in schema.fields() {
        match arguments.get(field.name) {
            None | Some(Value::Null) if !field.required => {}
            None => return Err(SchemaError::missing(field.name)),
            Some(value) if !field.field_type.matches(value) => {
                return Err(SchemaError::wrong_type(field.name, field.field_type, value))
            }
            Some(value) => {
                accepted.insert(field.name.to_string(), value.clone());
            }
        }
    }

    if policy == UnknownFieldPolicy::Reject {
        if let Some(extra) = arguments.keys().find(|key| schema.field(key).is_none()) {
            return Err(SchemaError::unknown(extra));
        }
    }

    Ok(ValidatedArguments(accepted))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
