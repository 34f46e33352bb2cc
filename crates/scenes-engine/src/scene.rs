//! Scene configuration and runtime model
//!
//! `SceneConfig`/`MemberConfig` mirror the host's configuration snapshot.
//! `Scene::from_config` normalizes a snapshot into the runtime shape the
//! engine works with: disabled members are dropped, invalid delay values are
//! logged and reset to 0, and an absent onFalse branch becomes a disabled
//! trigger spec.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scenes_core::{PointId, PointValue};

use crate::trigger::{Direction, TriggerSpec};

fn default_enabled() -> bool {
    true
}

/// Aggregation mode of a virtual-group scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Members must agree; any disagreement collapses to "uncertain"
    #[default]
    Uncertain,
    /// First value wins, unless it is falsy and a later one is truthy
    Any,
    /// Numeric average of compatible member values
    Avg,
    /// Numeric minimum (non-numeric values coerce to 0)
    Min,
    /// Numeric maximum (non-numeric values coerce to 0)
    Max,
}

/// One member of a scene, as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberConfig {
    /// The external point this member controls/observes
    pub id: PointId,

    /// Disabled members are dropped at load time
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Value to assert on a true activation; a `{{pointId}}` string is an
    /// indirection; null/absent means "do not act"
    #[serde(default)]
    pub set_if_true: Option<PointValue>,

    /// Value to assert on a false activation
    #[serde(default)]
    pub set_if_false: Option<PointValue>,

    /// Numeric tolerance for the true-side feedback comparison
    #[serde(default)]
    pub set_if_true_tolerance: Option<f64>,

    /// Numeric tolerance for the false-side feedback comparison
    #[serde(default)]
    pub set_if_false_tolerance: Option<f64>,

    /// Write delay in milliseconds; accepted as raw JSON and normalized
    #[serde(default)]
    pub delay: serde_json::Value,

    /// Subsequent members' delays accumulate onto this one's
    #[serde(default)]
    pub stack_next_delays: bool,

    /// Cancel pending delayed writes to this point before issuing a new one
    #[serde(default)]
    pub stop_all_delays: bool,

    /// Skip the write when the point already holds the desired value
    #[serde(default)]
    pub do_not_overwrite: bool,

    /// Acknowledgement flag used when writing
    #[serde(default)]
    pub ack_true: bool,
}

/// A scene definition, as delivered in a configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    /// Scene identifier; doubles as the scene's own status point
    pub id: PointId,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Disabled scenes are dropped at load time
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Virtual groups aggregate member values instead of asserting them
    #[serde(default)]
    pub virtual_group: bool,

    /// Aggregation mode, meaningful only for virtual groups
    #[serde(default)]
    pub aggregation: Aggregation,

    /// Milliseconds between successive member commands; 0 = all at once.
    /// Accepted as raw JSON and normalized.
    #[serde(default)]
    pub burst_interval: serde_json::Value,

    /// Ordered member sequence
    #[serde(default)]
    pub members: Vec<MemberConfig>,

    /// True-direction trigger (conceptually always present)
    #[serde(default)]
    pub on_true: TriggerSpec,

    /// False-direction trigger; only active when present and enabled
    #[serde(default)]
    pub on_false: Option<TriggerSpec>,
}

/// A member at runtime
#[derive(Debug, Clone)]
pub struct Member {
    pub point: PointId,
    pub set_if_true: Option<PointValue>,
    pub set_if_false: Option<PointValue>,
    pub set_if_true_tolerance: Option<f64>,
    pub set_if_false_tolerance: Option<f64>,
    /// Normalized write delay in milliseconds
    pub delay: u64,
    pub stack_next_delays: bool,
    pub stop_all_delays: bool,
    pub do_not_overwrite: bool,
    pub ack_true: bool,
    /// Last observed live value of the point; refreshed on every delivered
    /// change notification and at scene load, initially None
    pub actual: Option<PointValue>,
}

impl Member {
    fn from_config(config: MemberConfig, scene: &PointId) -> Self {
        let delay = normalize_millis(&config.delay, "delay", scene);
        Self {
            point: config.id,
            set_if_true: config.set_if_true,
            set_if_false: config.set_if_false,
            set_if_true_tolerance: config.set_if_true_tolerance,
            set_if_false_tolerance: config.set_if_false_tolerance,
            delay,
            stack_next_delays: config.stack_next_delays,
            stop_all_delays: config.stop_all_delays,
            do_not_overwrite: config.do_not_overwrite,
            ack_true: config.ack_true,
            actual: None,
        }
    }

    /// The value to assert for a direction, None meaning "do not act"
    pub fn set_value(&self, direction: Direction) -> Option<&PointValue> {
        match direction {
            Direction::True => self.set_if_true.as_ref(),
            Direction::False => self.set_if_false.as_ref(),
        }
    }

    /// The feedback tolerance for a direction
    pub fn tolerance(&self, direction: Direction) -> Option<f64> {
        match direction {
            Direction::True => self.set_if_true_tolerance,
            Direction::False => self.set_if_false_tolerance,
        }
    }
}

/// The scene's externally visible status, as last published
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneStatus {
    pub value: Option<PointValue>,
    pub acknowledged: bool,
}

/// A scene at runtime
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: PointId,
    pub name: Option<String>,
    pub enabled: bool,
    pub virtual_group: bool,
    pub aggregation: Aggregation,
    /// Normalized burst interval in milliseconds
    pub burst_interval: u64,
    pub members: Vec<Member>,
    pub on_true: TriggerSpec,
    pub on_false: TriggerSpec,
    pub status: SceneStatus,
}

impl Scene {
    /// Build the runtime scene from a configuration snapshot entry
    pub fn from_config(config: SceneConfig) -> Self {
        let burst_interval = normalize_millis(&config.burst_interval, "burstInterval", &config.id);

        let members = config
            .members
            .into_iter()
            .filter(|m| {
                if !m.enabled {
                    debug!(scene = %config.id, point = %m.id, "Dropping disabled member");
                }
                m.enabled
            })
            .map(|m| Member::from_config(m, &config.id))
            .collect();

        Self {
            id: config.id,
            name: config.name,
            enabled: config.enabled,
            virtual_group: config.virtual_group,
            aggregation: config.aggregation,
            burst_interval,
            members,
            on_true: config.on_true,
            on_false: config.on_false.unwrap_or_else(TriggerSpec::disabled),
            status: SceneStatus::default(),
        }
    }

    /// The trigger spec for a direction
    pub fn trigger(&self, direction: Direction) -> &TriggerSpec {
        match direction {
            Direction::True => &self.on_true,
            Direction::False => &self.on_false,
        }
    }

    /// Get display name (name or ID)
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Normalize a raw configured duration to integer milliseconds
///
/// Numbers and numeric strings truncate to their integer part; anything
/// else (negative, non-numeric, wrong type) is logged and reset to 0.
fn normalize_millis(raw: &serde_json::Value, field: &str, scene: &PointId) -> u64 {
    let parsed = match raw {
        serde_json::Value::Null => Some(0.0),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) if s.is_empty() => Some(0.0),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms.trunc() as u64,
        _ => {
            warn!(scene = %scene, field, value = %raw, "Invalid duration value, resetting to 0");
            0
        }
    }
}
