//! Trigger types
//!
//! A scene carries up to two trigger specs, one per activation direction.
//! Each spec may watch a point under a comparison condition, carry a cron
//! schedule, or both.

use serde::{Deserialize, Serialize};
use std::fmt;

use scenes_core::{PointId, PointValue};

/// Activation direction of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    True,
    False,
}

impl Direction {
    /// The boolean a scene asserts when activated in this direction
    pub fn desired(self) -> bool {
        matches!(self, Direction::True)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::True => "true",
            Direction::False => "false",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Comparison operator of a point trigger
///
/// Condition strings come straight from configuration; anything the engine
/// does not recognize is preserved as `Unknown` and rejected at evaluation
/// time with a logged error, leaving the scene inert for that trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum TriggerOp {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Update,
    Unknown(String),
}

impl From<String> for TriggerOp {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "==" => TriggerOp::Eq,
            "!=" => TriggerOp::Ne,
            ">" => TriggerOp::Gt,
            "<" => TriggerOp::Lt,
            ">=" => TriggerOp::Ge,
            "<=" => TriggerOp::Le,
            "update" => TriggerOp::Update,
            _ => TriggerOp::Unknown(s),
        }
    }
}

impl From<TriggerOp> for String {
    fn from(op: TriggerOp) -> Self {
        match op {
            TriggerOp::Eq => "==".to_string(),
            TriggerOp::Ne => "!=".to_string(),
            TriggerOp::Gt => ">".to_string(),
            TriggerOp::Lt => "<".to_string(),
            TriggerOp::Ge => ">=".to_string(),
            TriggerOp::Le => "<=".to_string(),
            TriggerOp::Update => "update".to_string(),
            TriggerOp::Unknown(s) => s,
        }
    }
}

/// A watched-point trigger condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTrigger {
    /// The point whose changes are watched
    pub id: PointId,

    /// Comparison operator, `==` when absent
    #[serde(default)]
    pub condition: TriggerOp,

    /// Comparison value
    #[serde(default)]
    pub value: Option<PointValue>,
}

/// Trigger specification for one direction of a scene
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    /// Whether this direction's trigger participates at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Watched-point condition, if any
    #[serde(default)]
    pub trigger: Option<PointTrigger>,

    /// Recurring cron schedule, if any
    #[serde(default)]
    pub cron: Option<String>,
}

impl TriggerSpec {
    /// A spec that never fires (used for an absent onFalse branch)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            trigger: None,
            cron: None,
        }
    }
}

impl Default for TriggerSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: None,
            cron: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}
