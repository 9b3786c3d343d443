//! Typed hyperparameter values.

use serde::{Deserialize, Serialize};

use crate::errors::HyperparameterError;

/// A concrete hyperparameter value.
///
/// Serialized untagged, so `{"ensemble_size": 25, "metric": "accuracy"}`
/// deserializes into `Int` and `Text` respectively. Integers above
/// `i64::MAX` (large seeds) land in `UInt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperparameterValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Structured(serde_json::Value),
}

impl HyperparameterValue {
    /// Name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool, HyperparameterError> {
        match self {
            Self::Bool(v) => Ok(*v),
            other => Err(other.mismatch(name, "bool")),
        }
    }

    pub fn as_int(&self, name: &str) -> Result<i64, HyperparameterError> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::UInt(v) => Err(HyperparameterError::InvalidValue {
                name: name.to_string(),
                message: format!("{v} does not fit in a signed 64-bit integer"),
            }),
            other => Err(other.mismatch(name, "int")),
        }
    }

    /// Integers widen to floats; nothing else does.
    pub fn as_float(&self, name: &str) -> Result<f64, HyperparameterError> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            Self::UInt(v) => Ok(*v as f64),
            other => Err(other.mismatch(name, "float")),
        }
    }

    pub fn as_str(&self, name: &str) -> Result<&str, HyperparameterError> {
        match self {
            Self::Text(v) => Ok(v.as_str()),
            other => Err(other.mismatch(name, "text")),
        }
    }

    /// Non-negative integer, e.g. a count or a size.
    pub fn as_usize(&self, name: &str) -> Result<usize, HyperparameterError> {
        if let Self::UInt(v) = self {
            return usize::try_from(*v).map_err(|_| HyperparameterError::InvalidValue {
                name: name.to_string(),
                message: format!("{v} is too large"),
            });
        }
        let value = self.as_int(name)?;
        usize::try_from(value).map_err(|_| HyperparameterError::InvalidValue {
            name: name.to_string(),
            message: format!("{value} is negative"),
        })
    }

    /// Any 64-bit seed; negative `Int` values are reinterpreted bitwise.
    pub fn as_seed(&self, name: &str) -> Result<u64, HyperparameterError> {
        match self {
            Self::UInt(v) => Ok(*v),
            other => other.as_int(name).map(|v| v as u64),
        }
    }

    fn mismatch(&self, name: &str, expected: &'static str) -> HyperparameterError {
        HyperparameterError::TypeMismatch {
            name: name.to_string(),
            expected,
            actual: self.kind(),
        }
    }
}

impl std::fmt::Display for HyperparameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Structured(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for HyperparameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for HyperparameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Values that fit in `i64` stay `Int`.
impl From<u64> for HyperparameterValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Self::Int).unwrap_or(Self::UInt(v))
    }
}

impl From<i32> for HyperparameterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for HyperparameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HyperparameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HyperparameterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<serde_json::Value> for HyperparameterValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}
