//! Point value type and its comparison/coercion rules
//!
//! Point values arrive from the host as loosely typed JSON. All of the
//! engine's comparisons go through the explicit rules defined here instead
//! of ad hoc conversions: `loose_eq` is the cross-type equality table,
//! `to_number` the numeric coercion, and `Display` the canonical
//! stringification used by trigger comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point's value
///
/// Untagged so configuration and host payloads deserialize naturally:
/// `true` → Bool, `21.5` → Number, `"on"` → Text, `null` → Null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

impl PointValue {
    /// Cross-type loose equality
    ///
    /// The rules mirror what the host's dynamic comparisons do, written out
    /// explicitly: numbers compare to numeric strings by parsed value,
    /// booleans compare to "true"/"false"/"1"/"0" strings and to 0/1
    /// numbers, and Null equals only Null.
    pub fn loose_eq(&self, other: &PointValue) -> bool {
        use PointValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Number(n), Text(s)) | (Text(s), Number(n)) => {
                s.parse::<f64>().map(|p| p == *n).unwrap_or(false)
            }
            (Bool(b), Text(s)) | (Text(s), Bool(b)) => match s.as_str() {
                "true" | "1" => *b,
                "false" | "0" => !*b,
                _ => false,
            },
            (Bool(b), Number(n)) | (Number(n), Bool(b)) => {
                *n == if *b { 1.0 } else { 0.0 }
            }
        }
    }

    /// Coerce to a number, treating non-numeric values as 0
    ///
    /// Used by min/max aggregation and tolerance comparison.
    pub fn to_number(&self) -> f64 {
        match self {
            PointValue::Number(n) => *n,
            PointValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            PointValue::Text(s) => s.parse().unwrap_or(0.0),
            PointValue::Null => 0.0,
        }
    }

    /// Strict numeric view: Some only for values that carry a number
    ///
    /// Numbers, numeric strings, and booleans (as 0/1) qualify; other text
    /// and Null do not. Used by avg aggregation to decide compatibility.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Number(n) => Some(*n),
            PointValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            PointValue::Text(s) => s.parse().ok(),
            PointValue::Null => None,
        }
    }

    /// Truthiness for the `any` aggregation fold
    pub fn is_truthy(&self) -> bool {
        match self {
            PointValue::Bool(b) => *b,
            PointValue::Number(n) => *n != 0.0,
            PointValue::Text(s) => !s.is_empty() && s != "false" && s != "0",
            PointValue::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PointValue::Null)
    }
}

impl fmt::Display for PointValue {
    /// Canonical stringification: whole numbers print without a fraction
    /// ("5", not "5.0"), matching how the host stringifies values
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Bool(b) => write!(f, "{}", b),
            PointValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            PointValue::Text(s) => write!(f, "{}", s),
            PointValue::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for PointValue {
    fn from(b: bool) -> Self {
        PointValue::Bool(b)
    }
}

impl From<f64> for PointValue {
    fn from(n: f64) -> Self {
        PointValue::Number(n)
    }
}

impl From<&str> for PointValue {
    fn from(s: &str) -> Self {
        PointValue::Text(s.to_string())
    }
}

impl From<String> for PointValue {
    fn from(s: String) -> Self {
        PointValue::Text(s)
    }
}

/// Parse a string that is a "clean" number: it must parse as f64 and
/// stringify back to exactly itself
///
/// "10" is clean; "5.0" and "5x" are not. Trigger comparison uses this to
/// decide between numeric and lexical relational comparison.
pub fn clean_number(s: &str) -> Option<f64> {
    let n: f64 = s.parse().ok()?;
    if PointValue::Number(n).to_string() == s {
        Some(n)
    } else {
        None
    }
}

impl PointValue {
    /// See [`clean_number`]: Some only when this value stringifies to a
    /// clean numeric form
    pub fn clean_number(&self) -> Option<f64> {
        match self {
            PointValue::Number(n) if n.is_finite() => Some(*n),
            _ => clean_number(&self.to_string()),
        }
    }
}
