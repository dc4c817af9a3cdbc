//! Closed parameter schemas and validation
//!
//! Every tool declares its parameters as a fixed set of `{name, type, required}`
//! entries. Validation is a total function over that set.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime type a parameter value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" => Some(Self::String),
            "number" | "integer" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// Check whether a JSON value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            description: None,
        }
    }

    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Why a parameter bag was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The parameter bag itself is not a JSON object
    NotAnObject,
    /// A required field is absent
    Missing { field: String },
    /// A present field has the wrong runtime type
    WrongType {
        field: String,
        expected: ParamType,
    },
}

impl SchemaViolation {
    /// The offending field, reported as the failure detail
    pub fn field(&self) -> &str {
        match self {
            Self::NotAnObject => "<parameters>",
            Self::Missing { field } | Self::WrongType { field, .. } => field,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "parameters must be a JSON object"),
            Self::Missing { field } => write!(f, "missing required field '{}'", field),
            Self::WrongType { field, expected } => {
                write!(f, "field '{}' must be of type {}", field, expected)
            }
        }
    }
}

/// Declared parameters of a tool, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter declaration
    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Names of required parameters, in name order
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Validate a parameter bag, reporting the first violation in name order.
    ///
    /// `null` parameters count as an empty object and a `null` field counts as absent.
    /// Fields not declared in the schema are accepted as-is.
    pub fn validate(&self, params: &Value) -> Result<(), SchemaViolation> {
        let empty = serde_json::Map::new();
        let fields = match params {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => return Err(SchemaViolation::NotAnObject),
        };

        for (name, spec) in &self.params {
            match fields.get(name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(SchemaViolation::Missing { field: name.clone() });
                    }
                }
                Some(value) => {
                    if !spec.param_type.matches(value) {
                        return Err(SchemaViolation::WrongType {
                            field: name.clone(),
                            expected: spec.param_type,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Render as a JSON schema object for oracle prompts and external consumers
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for (name, spec) in &self.params {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), Value::String(spec.param_type.to_string()));
            if let Some(desc) = &spec.description {
                prop.insert("description".to_string(), Value::String(desc.clone()));
            }
            properties.insert(name.clone(), Value::Object(prop));
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }
}
