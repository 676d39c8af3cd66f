//! Request validation for job submission
//!
//! Each controller declares a [`ParameterSchema`]; [`validate_request`] checks a raw
//! JSON submission against the standard request fields plus that schema and returns
//! either a typed [`ValidatedRequest`] or every violation found, each naming the
//! offending field. Nothing is persisted before validation succeeds.

use crate::constants::request_fields;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum allowed size for a serialized submission (1MB)
const MAX_JSON_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum nesting depth for JSON objects/arrays
const MAX_JSON_DEPTH: usize = 10;

/// Maximum string length for JSON string values
const MAX_JSON_STRING_LENGTH: usize = 10_000;

/// How fields outside the schema are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Unknown fields are rejected
    #[default]
    Strict,
    /// Unknown fields are passed through to the controller (and the job identity)
    Lenient,
}

/// JSON type a field must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Name of the JSON type of `value`, for error messages
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of one controller-specific request field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub allowed_values: Option<Vec<Value>>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub item_type: Option<FieldType>,
    pub min_items: Option<usize>,
}

impl FieldSpec {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            default: None,
            allowed_values: None,
            min: None,
            max: None,
            item_type: None,
            min_items: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldType::Object)
    }

    pub fn array_of(name: &'static str, item_type: FieldType) -> Self {
        let mut spec = Self::new(name, FieldType::Array);
        spec.item_type = Some(item_type);
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, allowed: Vec<Value>) -> Self {
        self.allowed_values = Some(allowed);
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.min_items = Some(1);
        self
    }

    fn check(&self, value: &Value, violations: &mut Vec<ValidationViolation>) {
        if !self.field_type.matches(value) {
            violations.push(ValidationViolation::wrong_type(
                self.name,
                self.field_type.name(),
                json_type_name(value),
            ));
            return;
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                violations.push(ValidationViolation::new(
                    self.name,
                    ViolationKind::DisallowedValue {
                        allowed: allowed
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                        actual: value.to_string(),
                    },
                ));
            }
        }

        if let Some(n) = value.as_i64() {
            let below = self.min.is_some_and(|min| n < min);
            let above = self.max.is_some_and(|max| n > max);
            if below || above {
                violations.push(ValidationViolation::new(
                    self.name,
                    ViolationKind::DisallowedValue {
                        allowed: format!(
                            "{}..={}",
                            self.min.map_or("".to_string(), |v| v.to_string()),
                            self.max.map_or("".to_string(), |v| v.to_string())
                        ),
                        actual: n.to_string(),
                    },
                ));
            }
        }

        if let Value::Array(items) = value {
            if let Some(min_items) = self.min_items {
                if items.len() < min_items {
                    violations.push(ValidationViolation::new(
                        self.name,
                        ViolationKind::DisallowedValue {
                            allowed: format!("at least {min_items} item(s)"),
                            actual: format!("{} item(s)", items.len()),
                        },
                    ));
                }
            }
            if let Some(item_type) = self.item_type {
                for (i, item) in items.iter().enumerate() {
                    if !item_type.matches(item) {
                        violations.push(ValidationViolation::wrong_type(
                            format!("{}[{i}]", self.name),
                            item_type.name(),
                            json_type_name(item),
                        ));
                    }
                }
            }
        }
    }
}

/// Controller-specific request schema
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    fields: Vec<FieldSpec>,
    /// (deprecated name, replacement)
    deprecated: Vec<(&'static str, &'static str)>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn deprecated(mut self, old_name: &'static str, replacement: &'static str) -> Self {
        self.deprecated.push((old_name, replacement));
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    fn replacement_for(&self, name: &str) -> Option<&'static str> {
        self.deprecated
            .iter()
            .find(|(old, _)| *old == name)
            .map(|(_, replacement)| *replacement)
    }
}

/// What is wrong with a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    MissingField,
    WrongType { expected: String, actual: String },
    UnknownField,
    DisallowedValue { allowed: String, actual: String },
    DeprecatedField { replacement: String },
    PayloadLimit { reason: String },
}

/// A single schema violation, always naming the field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub field: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl ValidationViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn wrong_type(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(
            field,
            ViolationKind::WrongType {
                expected: expected.into(),
                actual: actual.into(),
            },
        )
    }
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingField => write!(f, "{}: missing required field", self.field),
            ViolationKind::WrongType { expected, actual } => {
                write!(f, "{}: expected {expected}, got {actual}", self.field)
            }
            ViolationKind::UnknownField => write!(f, "{}: unknown field", self.field),
            ViolationKind::DisallowedValue { allowed, actual } => {
                write!(f, "{}: value {actual} not allowed (allowed: {allowed})", self.field)
            }
            ViolationKind::DeprecatedField { replacement } => {
                write!(f, "{}: deprecated, use '{replacement}'", self.field)
            }
            ViolationKind::PayloadLimit { reason } => write!(f, "{}: {reason}", self.field),
        }
    }
}

/// All violations found in one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub violations: Vec<ValidationViolation>,
}

impl ValidationErrors {
    pub fn new(violations: Vec<ValidationViolation>) -> Self {
        Self { violations }
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names of the offending fields
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn has(&self, field: &str, predicate: impl Fn(&ViolationKind) -> bool) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && predicate(&v.kind))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// A submission that passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRequest {
    pub job_type: String,
    pub dataset_id: Option<String>,
    pub resource_id: Option<String>,
    pub version_id: Option<String>,
    pub system: bool,
    /// Controller-specific fields with defaults applied
    pub parameters: BTreeMap<String, Value>,
}

impl ValidatedRequest {
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Standard fields merged with controller parameters.
    ///
    /// This is the content the job identity is derived from and what the job
    /// record stores as its parameters.
    pub fn normalized(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.parameters {
            map.insert(key.clone(), value.clone());
        }
        map.insert(
            request_fields::JOB_TYPE.to_string(),
            Value::String(self.job_type.clone()),
        );
        map.insert(
            request_fields::DATASET_ID.to_string(),
            self.dataset_id.clone().map_or(Value::Null, Value::String),
        );
        map.insert(
            request_fields::RESOURCE_ID.to_string(),
            self.resource_id.clone().map_or(Value::Null, Value::String),
        );
        map.insert(
            request_fields::VERSION_ID.to_string(),
            self.version_id.clone().map_or(Value::Null, Value::String),
        );
        map.insert(request_fields::SYSTEM.to_string(), Value::Bool(self.system));
        Value::Object(map)
    }
}

/// Extract the operation type, which selects the controller (and its schema)
pub fn extract_job_type(raw: &Value) -> Result<String, ValidationErrors> {
    let Some(object) = raw.as_object() else {
        return Err(ValidationErrors::new(vec![ValidationViolation::wrong_type(
            "request",
            "object",
            json_type_name(raw),
        )]));
    };

    match object.get(request_fields::JOB_TYPE) {
        None | Some(Value::Null) => Err(ValidationErrors::new(vec![ValidationViolation::new(
            request_fields::JOB_TYPE,
            ViolationKind::MissingField,
        )])),
        Some(Value::String(job_type)) if !job_type.trim().is_empty() => Ok(job_type.clone()),
        Some(Value::String(_)) => Err(ValidationErrors::new(vec![ValidationViolation::new(
            request_fields::JOB_TYPE,
            ViolationKind::DisallowedValue {
                allowed: "non-empty operation name".to_string(),
                actual: "\"\"".to_string(),
            },
        )])),
        Some(other) => Err(ValidationErrors::new(vec![ValidationViolation::wrong_type(
            request_fields::JOB_TYPE,
            "string",
            json_type_name(other),
        )])),
    }
}

/// Validate a raw submission against the standard fields and a controller schema
pub fn validate_request(
    raw: &Value,
    schema: &ParameterSchema,
    mode: ValidationMode,
) -> Result<ValidatedRequest, ValidationErrors> {
    let job_type = extract_job_type(raw)?;
    // extract_job_type has already rejected non-objects
    let object = raw.as_object().cloned().unwrap_or_default();

    let mut violations = Vec::new();
    check_payload_limits(raw, &mut violations);

    let system = match object.get(request_fields::SYSTEM) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            violations.push(ValidationViolation::wrong_type(
                request_fields::SYSTEM,
                "boolean",
                json_type_name(other),
            ));
            false
        }
    };

    let mut identifiers: BTreeMap<&str, Option<String>> = BTreeMap::new();
    for field in request_fields::DOMAIN_IDENTIFIERS {
        let value = match object.get(*field) {
            None | Some(Value::Null) => {
                if !system {
                    violations.push(ValidationViolation::new(*field, ViolationKind::MissingField));
                }
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() && !system => {
                violations.push(ValidationViolation::new(*field, ViolationKind::MissingField));
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                violations.push(ValidationViolation::wrong_type(
                    *field,
                    "string",
                    json_type_name(other),
                ));
                None
            }
        };
        identifiers.insert(field, value);
    }

    let mut parameters = BTreeMap::new();
    for (key, value) in &object {
        if request_fields::ALL.contains(&key.as_str()) {
            continue;
        }
        if let Some(replacement) = schema.replacement_for(key) {
            violations.push(ValidationViolation::new(
                key.clone(),
                ViolationKind::DeprecatedField {
                    replacement: replacement.to_string(),
                },
            ));
            continue;
        }
        match schema.spec(key) {
            Some(spec) => {
                if value.is_null() {
                    continue;
                }
                spec.check(value, &mut violations);
                parameters.insert(key.clone(), value.clone());
            }
            None => match mode {
                ValidationMode::Strict => {
                    violations.push(ValidationViolation::new(key.clone(), ViolationKind::UnknownField))
                }
                ValidationMode::Lenient => {
                    parameters.insert(key.clone(), value.clone());
                }
            },
        }
    }

    for spec in schema.fields() {
        if parameters.contains_key(spec.name) {
            continue;
        }
        if let Some(default) = &spec.default {
            parameters.insert(spec.name.to_string(), default.clone());
        } else if spec.required {
            let superseded_by_deprecated = schema
                .deprecated
                .iter()
                .any(|(old, replacement)| *replacement == spec.name && object.contains_key(*old));
            if !superseded_by_deprecated {
                violations.push(ValidationViolation::new(spec.name, ViolationKind::MissingField));
            }
        }
    }

    if !violations.is_empty() {
        return Err(ValidationErrors::new(violations));
    }

    Ok(ValidatedRequest {
        job_type,
        dataset_id: identifiers.remove(request_fields::DATASET_ID).flatten(),
        resource_id: identifiers.remove(request_fields::RESOURCE_ID).flatten(),
        version_id: identifiers.remove(request_fields::VERSION_ID).flatten(),
        system,
        parameters,
    })
}

/// Size and shape limits on the whole submission
fn check_payload_limits(value: &Value, violations: &mut Vec<ValidationViolation>) {
    let size = value.to_string().len();
    if size > MAX_JSON_SIZE_BYTES {
        violations.push(ValidationViolation::new(
            "request",
            ViolationKind::PayloadLimit {
                reason: format!("payload too large: {size} bytes (max: {MAX_JSON_SIZE_BYTES})"),
            },
        ));
        return;
    }
    check_json_depth(value, "request", 0, violations);
}

fn check_json_depth(
    value: &Value,
    path: &str,
    depth: usize,
    violations: &mut Vec<ValidationViolation>,
) {
    if depth > MAX_JSON_DEPTH {
        violations.push(ValidationViolation::new(
            path,
            ViolationKind::PayloadLimit {
                reason: format!("nesting too deep (max: {MAX_JSON_DEPTH})"),
            },
        ));
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                check_json_depth(val, key, depth + 1, violations);
            }
        }
        Value::Array(items) => {
            for item in items {
                check_json_depth(item, path, depth + 1, violations);
            }
        }
        Value::String(s) if s.len() > MAX_JSON_STRING_LENGTH => {
            violations.push(ValidationViolation::new(
                path,
                ViolationKind::PayloadLimit {
                    reason: format!(
                        "string too long: {} chars (max: {MAX_JSON_STRING_LENGTH})",
                        s.len()
                    ),
                },
            ));
        }
        _ => {}
    }
}
