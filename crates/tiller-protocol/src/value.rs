//! Scalar cell values.

use serde::Deserialize;
use serde::Serialize;

/// A scalar value: a replacement payload or a single table cell.
///
/// Serializes untagged, so JSON numbers, strings and booleans map directly.
/// Integer literals deserialize as `Int`; anything with a fractional part
/// becomes `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean cell.
    Bool(bool),
    /// Integer cell.
    Int(i64),
    /// Floating-point cell.
    Float(f64),
    /// Text cell.
    Text(String),
}

impl Value {
    /// Numeric view of the value, if one exists.
    ///
    /// Booleans coerce to 0/1 and text is parsed after trimming; text that
    /// does not parse as a number yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}
