//! Values carried by filter dimensions.
use serde::{Deserialize, Serialize};

/// Value of one filter dimension as sent by the client.
///
/// Deserialised untagged: a two-element integer array is a range, then
/// booleans, then integers. Anything else (strings, nested objects) is kept
/// verbatim in [`FilterValue::Other`] and is never compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Inclusive `[min, max]` range.
    Range([i64; 2]),
    /// Toggle.
    Bool(bool),
    /// Scalar such as a gender code.
    Int(i64),
    /// Unrecognised payload carried through untouched.
    Other(serde_json::Value),
}

impl FilterValue {
    /// Returns the range bounds when this is a range.
    pub fn as_range(&self) -> Option<[i64; 2]> {
        match self {
            FilterValue::Range(range) => Some(*range),
            _ => None,
        }
    }

    /// Returns the toggle state; non-boolean values count as off.
    pub fn as_bool(&self) -> bool {
        matches!(self, FilterValue::Bool(true))
    }

    /// Returns the scalar when this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FilterValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this value deviates from `default`. Ranges compare
    /// element-wise, everything else by plain inequality.
    pub fn differs_from(&self, default: &FilterValue) -> bool {
        match (self, default) {
            (FilterValue::Range(value), FilterValue::Range(default)) => {
                value.iter().zip(default.iter()).any(|(v, d)| v != d)
            }
            (value, default) => value != default,
        }
    }
}

impl From<[i64; 2]> for FilterValue {
    fn from(value: [i64; 2]) -> Self {
        FilterValue::Range(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}
