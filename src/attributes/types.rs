//! Attribute declarations
//!
//! Supported types:
//! - string: UTF-8 string
//! - int: 64-bit unsigned integer
//! - bool: boolean

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    Bool,
}

impl AttributeType {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Bool => "bool",
        }
    }

    /// Exact type match, no coercion.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            AttributeType::String => value.is_string(),
            AttributeType::Int => value.is_u64(),
            AttributeType::Bool => value.is_boolean(),
        }
    }
}

/// Who may change an attribute, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    /// Settable at creation and by any later update.
    Mutable,
    /// Settable while unset; fixed once it has a value.
    ImmutableAfterSet,
    /// Computed by the system; never set by callers.
    Derived,
    /// Mutable, but its value is masked whenever it is read back.
    Secure,
}

/// Declaration of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub mutability: Mutability,
    /// Must be present at creation unless a default exists.
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Closed set of values callers may write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType, mutability: Mutability) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            mutability,
            required: false,
            default: None,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn allowing(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed = Some(values.into_iter().collect());
        self
    }

    pub fn is_secure(&self) -> bool {
        self.mutability == Mutability::Secure
    }
}
