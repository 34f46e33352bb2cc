//! Point ID type identifying an external point

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid point IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PointIdError {
    #[error("point id cannot be empty")]
    Empty,

    #[error("point id cannot contain whitespace")]
    Whitespace,
}

/// Identifies a point in the host's point space (e.g. "hall.light.level")
///
/// Point IDs are opaque to the engine: the host defines their structure.
/// The engine only requires them to be non-empty and whitespace-free so
/// they survive stringification in value indirections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PointId(String);

impl PointId {
    /// Create a new PointId, validating the raw string
    pub fn new(id: impl Into<String>) -> Result<Self, PointIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(PointIdError::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(PointIdError::Whitespace);
        }
        Ok(Self(id))
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PointId {
    type Err = PointIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PointId {
    type Error = PointIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PointId> for String {
    fn from(id: PointId) -> Self {
        id.0
    }
}
