//! Per-field persistence metadata.
//!
//! A [`PropertyDescriptor`] names the wire attribute a field is stored under,
//! whether it must be present, and which scalar coercion to apply on the way
//! in and out.

use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};

use crate::errors::{Error, Result};

/// Scalar coercion applied to a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Integer,
    Float,
    Boolean,
    String,
    List,
    Map,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
            ScalarType::String => "string",
            ScalarType::List => "list",
            ScalarType::Map => "map",
        }
    }

    /// Coerce `value` to this type.
    ///
    /// Returns `None` when the value has no sensible representation in the
    /// target type. `Null` is never passed in; the mapper skips coercion for it.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match self {
            ScalarType::Integer => to_integer(value),
            ScalarType::Float => to_float(value),
            ScalarType::Boolean => to_boolean(value),
            ScalarType::String => to_string(value),
            ScalarType::List => match value {
                Value::Array(_) => Some(value),
                _ => None,
            },
            ScalarType::Map => match value {
                Value::Object(_) => Some(value),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "int" | "integer" => Ok(ScalarType::Integer),
            "float" | "double" => Ok(ScalarType::Float),
            "bool" | "boolean" => Ok(ScalarType::Boolean),
            "string" => Ok(ScalarType::String),
            "array" | "list" => Ok(ScalarType::List),
            "map" | "object" => Ok(ScalarType::Map),
            _ => Err(Error::Configuration(format!(
                "Invalid scalar type: '{}'. Use 'integer', 'float', 'boolean', 'string', 'list' or 'map'",
                tag
            ))),
        }
    }
}

fn to_integer(value: Value) -> Option<Value> {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(Value::Number(n))
            } else {
                let f = n.as_f64()?;
                float_to_integer(f)
            }
        }
        Value::Bool(b) => Some(Value::from(b as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Some(Value::from(i))
            } else {
                float_to_integer(trimmed.parse::<f64>().ok()?)
            }
        }
        _ => None,
    }
}

fn float_to_integer(f: f64) -> Option<Value> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(Value::from(f.trunc() as i64))
    } else {
        None
    }
}

fn to_float(value: Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(f).map(Value::Number)
}

fn to_boolean(value: Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value),
        Value::Number(n) => Some(Value::Bool(n.as_f64()? != 0.0)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "0" | "false" => Some(Value::Bool(false)),
            "1" | "true" => Some(Value::Bool(true)),
            _ => None,
        },
        _ => None,
    }
}

fn to_string(value: Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

/// Whether a value counts as blank for the required check.
///
/// Null, empty strings and empty collections are blank. Numbers and booleans
/// never are, so `0` and `false` satisfy a required field.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(list) => list.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) | Value::Bool(_) => false,
    }
}

/// Static persistence metadata for one mapped field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    name: String,
    scalar_type: Option<ScalarType>,
    required: bool,
}

impl PropertyDescriptor {
    /// Create a descriptor for the wire attribute `name`.
    ///
    /// An empty name is a configuration error.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Configuration(
                "The attribute 'name' is required.".to_string(),
            ));
        }
        Ok(Self {
            name,
            scalar_type: None,
            required: false,
        })
    }

    /// Mark the field as required in both directions.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declare a scalar coercion.
    pub fn typed(mut self, scalar_type: ScalarType) -> Self {
        self.scalar_type = Some(scalar_type);
        self
    }

    /// Declare a scalar coercion from its textual tag (e.g. `"int"`).
    pub fn with_type_tag(self, tag: &str) -> Result<Self> {
        Ok(self.typed(tag.parse()?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        self.scalar_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Fail with a validation error when the field is required and `value` is blank.
    pub fn check(&self, value: &Value) -> Result<()> {
        if self.required && is_blank(value) {
            let received = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(Error::Validation {
                field: self.name.clone(),
                received,
            });
        }
        Ok(())
    }

    /// Apply the declared coercion, if any. Null and untyped values pass through.
    pub fn cast(&self, value: Value) -> Result<Value> {
        let scalar_type = match self.scalar_type {
            Some(t) if !value.is_null() => t,
            _ => return Ok(value),
        };
        scalar_type.coerce(value).ok_or_else(|| Error::Type {
            field: self.name.clone(),
            expected: scalar_type.to_string(),
        })
    }
}
