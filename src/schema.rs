//! Transformer option schemas and their validation
//!
//! Each transformer may declare an [`OptionSchema`]: a mapping from option
//! name to an [`OptionRule`]. A rule is a JSON Schema (draft 7) fragment for
//! the option's value plus a `required` flag. Defaults are taken from the
//! fragment's `default` keyword.
//!
//! [`validate`] never fails early: it walks every option and every rule and
//! returns [`Validation::Invalid`] with all violations at once.

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::{Draft, JSONSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options as written by the user, before validation
pub type RawOptions = Map<String, Value>;

/// Validation rule for a single option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRule {
    /// JSON Schema fragment the value must satisfy
    pub schema: Value,
    /// Whether the option must be present
    #[serde(default)]
    pub required: bool,
    /// Human-readable description (shown by `bundless transformers`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OptionRule {
    /// Create a rule from a JSON Schema fragment
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            required: false,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(serde_json::json!({ "type": "string" }))
    }

    pub fn boolean() -> Self {
        Self::new(serde_json::json!({ "type": "boolean" }))
    }

    /// An object whose values are all strings
    pub fn string_map() -> Self {
        Self::new(serde_json::json!({
            "type": "object",
            "additionalProperties": { "type": "string" }
        }))
    }

    /// Mark the option as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a default value (stored as the fragment's `default` keyword)
    pub fn with_default(mut self, value: Value) -> Self {
        if let Value::Object(map) = &mut self.schema {
            map.insert("default".to_string(), value);
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Default value, if the fragment declares one
    pub fn default_value(&self) -> Option<&Value> {
        self.schema.get("default")
    }

    /// Check a value against this rule, reporting every failed keyword
    fn check(&self, field: &str, value: &Value) -> Vec<FieldViolation> {
        let compiled = match JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&self.schema)
        {
            Ok(compiled) => compiled,
            Err(err) => {
                return vec![FieldViolation::new(field, format!("invalid rule: {}", err))];
            }
        };

        let violations = match compiled.validate(value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|err| {
                    let pointer = err.instance_path.to_string();
                    let location = if pointer.is_empty() {
                        field.to_string()
                    } else {
                        format!("{}{}", field, pointer)
                    };
                    FieldViolation::new(location, err.to_string())
                })
                .collect(),
        };
        violations
    }
}

/// Declared option schema of a transformer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSchema {
    rules: BTreeMap<String, OptionRule>,
}

impl OptionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `name`
    pub fn field(mut self, name: impl Into<String>, rule: OptionRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Rules sorted by option name
    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A single violated option field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Option name, with a JSON pointer suffix for nested values
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Options that passed validation, with defaults applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedOptions(Map<String, Value>);

impl ValidatedOptions {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserialize into a transformer's typed options struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }
}

/// Outcome of validating options against a schema
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(ValidatedOptions),
    Invalid(Vec<FieldViolation>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }

    pub fn into_result(self) -> Result<ValidatedOptions, Vec<FieldViolation>> {
        match self {
            Validation::Valid(options) => Ok(options),
            Validation::Invalid(violations) => Err(violations),
        }
    }
}

/// Validate user options against a transformer's declared schema.
///
/// A transformer without a schema accepts no options: an empty map is valid,
/// every key of a non-empty map is a violation.
pub fn validate(schema: Option<&OptionSchema>, options: &RawOptions) -> Validation {
    let Some(schema) = schema else {
        if options.is_empty() {
            return Validation::Valid(ValidatedOptions::empty());
        }
        return Validation::Invalid(
            options
                .keys()
                .map(|key| FieldViolation::new(key, "transformer does not accept options"))
                .collect(),
        );
    };

    let mut violations: Vec<FieldViolation> = options
        .keys()
        .filter(|key| !schema.contains(key))
        .map(|key| FieldViolation::new(key, "unknown option"))
        .collect();

    let mut normalized = Map::new();
    for (name, rule) in schema.iter() {
        match options.get(name) {
            Some(value) => {
                violations.extend(rule.check(name, value));
                normalized.insert(name.clone(), value.clone());
            }
            None if rule.required => {
                violations.push(FieldViolation::new(name, "required option is missing"));
            }
            None => {
                if let Some(default) = rule.default_value() {
                    normalized.insert(name.clone(), default.clone());
                }
            }
        }
    }

    if violations.is_empty() {
        Validation::Valid(ValidatedOptions(normalized))
    } else {
        Validation::Invalid(violations)
    }
}
