//! Attribute schema validator
//!
//! Validation semantics:
//! - Undeclared attributes are rejected
//! - Types match exactly, no coercion
//! - Null clears an optional attribute and is rejected for required ones
//! - Derived attributes are never written by callers
//! - Immutable-after-set attributes keep their first value
//!
//! The validator never mutates its inputs. Every failure is a `Validation`
//! failure raised before anything is written.

use serde_json::{Map, Value};

use super::types::{AttributeSpec, Mutability};
use crate::failure::{Failure, FailureResult};

/// Placeholder returned instead of a secure value.
pub const MASKED_VALUE: &str = "*****";

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    category: String,
    specs: Vec<AttributeSpec>,
}

impl AttributeSchema {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            specs: Vec::new(),
        }
    }

    pub fn with(mut self, spec: AttributeSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn spec(&self, name: &str) -> Option<&AttributeSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn specs(&self) -> &[AttributeSpec] {
        &self.specs
    }

    fn reject(&self, name: &str, reason: impl std::fmt::Display) -> Failure {
        Failure::validation(format!(
            "{} attribute '{}': {}",
            self.category, name, reason
        ))
    }

    fn declared(&self, name: &str) -> FailureResult<&AttributeSpec> {
        self.spec(name)
            .ok_or_else(|| self.reject(name, "not a declared attribute"))
    }

    fn check_value(&self, spec: &AttributeSpec, value: &Value) -> FailureResult<()> {
        if value.is_null() {
            if spec.required {
                return Err(self.reject(&spec.name, "is required and cannot be cleared"));
            }
            return Ok(());
        }
        if !spec.attribute_type.accepts(value) {
            return Err(self.reject(
                &spec.name,
                format!("expected {}, got {}", spec.attribute_type.type_name(), value),
            ));
        }
        if let Some(allowed) = &spec.allowed {
            if !allowed.contains(value) {
                return Err(self.reject(&spec.name, format!("value {} is not permitted", value)));
            }
        }
        Ok(())
    }

    /// Validate the attributes of a new object and fill in defaults.
    pub fn validate_create(&self, attributes: &Map<String, Value>) -> FailureResult<Map<String, Value>> {
        for (name, value) in attributes {
            let spec = self.declared(name)?;
            if spec.mutability == Mutability::Derived {
                return Err(self.reject(name, "is derived and cannot be set"));
            }
            self.check_value(spec, value)?;
        }

        let mut resolved = attributes.clone();
        for spec in &self.specs {
            if resolved.get(&spec.name).map_or(true, Value::is_null) {
                match &spec.default {
                    Some(default) => {
                        resolved.insert(spec.name.clone(), default.clone());
                    }
                    None if spec.required => {
                        return Err(self.reject(&spec.name, "is required"));
                    }
                    None => {}
                }
            }
        }
        Ok(resolved)
    }

    /// Validate `changes` against the current values. Returns only the
    /// entries that actually change something.
    pub fn validate_update(
        &self,
        current: &Map<String, Value>,
        changes: &Map<String, Value>,
    ) -> FailureResult<Map<String, Value>> {
        let mut effective = Map::new();
        for (name, value) in changes {
            let spec = self.declared(name)?;
            let existing = current.get(name).unwrap_or(&Value::Null);
            // Echoing back the current value is not an update, even for
            // immutable and derived attributes.
            if existing == value {
                continue;
            }
            match spec.mutability {
                Mutability::Derived => {
                    return Err(self.reject(name, "is derived and cannot be set"));
                }
                Mutability::ImmutableAfterSet if !existing.is_null() => {
                    return Err(self.reject(
                        name,
                        format!("is immutable; current value {}", existing),
                    ));
                }
                _ => {}
            }
            self.check_value(spec, value)?;
            effective.insert(name.clone(), value.clone());
        }
        Ok(effective)
    }

    /// Copy of `attributes` with every set secure value masked.
    pub fn redact(&self, attributes: &Map<String, Value>) -> Map<String, Value> {
        attributes
            .iter()
            .map(|(name, value)| {
                let secure = self.spec(name).is_some_and(AttributeSpec::is_secure);
                if secure && !value.is_null() {
                    (name.clone(), Value::String(MASKED_VALUE.to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeType;
    use crate::failure::FailureKind;
    use serde_json::json;

    fn schema() -> AttributeSchema {
        AttributeSchema::new("widget")
            .with(AttributeSpec::new("id", AttributeType::String, Mutability::ImmutableAfterSet).required())
            .with(
                AttributeSpec::new("size", AttributeType::Int, Mutability::Mutable)
                    .with_default(json!(1)),
            )
            .with(AttributeSpec::new("checksum", AttributeType::Int, Mutability::Derived))
            .with(AttributeSpec::new("password", AttributeType::String, Mutability::Secure))
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_fills_defaults() {
        let resolved = schema().validate_create(&map(json!({"id": "w1"}))).unwrap();
        assert_eq!(resolved["size"], json!(1));
    }

    #[test]
    fn test_create_requires_required() {
        let err = schema().validate_create(&map(json!({"size": 3}))).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    #[test]
    fn test_no_type_coercion() {
        assert!(schema()
            .validate_create(&map(json!({"id": "w1", "size": "3"})))
            .is_err());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        assert!(schema()
            .validate_update(&Map::new(), &map(json!({"colour": "red"})))
            .is_err());
    }

    #[test]
    fn test_immutable_after_set() {
        let current = map(json!({"id": "w1", "size": 1}));
        assert!(schema()
            .validate_update(&current, &map(json!({"id": "w2"})))
            .is_err());

        // Same value is a no-op, not a violation.
        let effective = schema()
            .validate_update(&current, &map(json!({"id": "w1", "size": 2})))
            .unwrap();
        assert_eq!(effective, map(json!({"size": 2})));
    }

    #[test]
    fn test_derived_cannot_be_written() {
        let current = map(json!({"id": "w1", "checksum": 7}));
        assert!(schema()
            .validate_update(&current, &map(json!({"checksum": 8})))
            .is_err());
    }

    #[test]
    fn test_secure_values_are_masked() {
        let redacted = schema().redact(&map(json!({"id": "w1", "password": "hunter2"})));
        assert_eq!(redacted["password"], json!(MASKED_VALUE));
        assert_eq!(redacted["id"], json!("w1"));
    }
}
