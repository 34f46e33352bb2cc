//! Trigger condition matching
//!
//! Decides, given a change notification on some point, whether a trigger
//! spec's condition now holds. Evaluation is invoked once per direction per
//! delivered change; both directions may fire independently.

use std::cmp::Ordering;

use scenes_core::{clean_number, PointId, PointValue};

use crate::error::{EngineError, EngineResult};
use crate::trigger::{TriggerOp, TriggerSpec};

/// Evaluate a trigger spec against a delivered point change
///
/// Returns true when the spec is enabled, watches the changed point, and
/// its condition holds for the new value.
pub fn matches(
    spec: &TriggerSpec,
    point_id: &PointId,
    new_value: &PointValue,
) -> EngineResult<bool> {
    if !spec.enabled {
        return Ok(false);
    }
    let Some(trigger) = &spec.trigger else {
        return Ok(false);
    };
    if trigger.id != *point_id {
        return Ok(false);
    }

    let incoming = new_value.to_string();
    let configured = trigger
        .value
        .as_ref()
        .map(PointValue::to_string)
        .unwrap_or_default();

    match &trigger.condition {
        TriggerOp::Eq => Ok(incoming == configured),
        TriggerOp::Ne => Ok(incoming != configured),
        TriggerOp::Update => Ok(true),
        TriggerOp::Gt => Ok(relational(&incoming, &configured) == Ordering::Greater),
        TriggerOp::Lt => Ok(relational(&incoming, &configured) == Ordering::Less),
        TriggerOp::Ge => Ok(relational(&incoming, &configured) != Ordering::Less),
        TriggerOp::Le => Ok(relational(&incoming, &configured) != Ordering::Greater),
        TriggerOp::Unknown(s) => Err(EngineError::UnsupportedCondition(s.clone())),
    }
}

/// Order the incoming value against the configured one
///
/// Numeric ordering applies only when BOTH sides are "clean" numbers
/// (stringify back to themselves); otherwise the comparison falls back to
/// plain lexical ordering of the raw strings. The fallback looks like an
/// accident of history and probably is one, but existing configurations
/// depend on it, so it is preserved exactly.
fn relational(incoming: &str, configured: &str) -> Ordering {
    match (clean_number(incoming), clean_number(configured)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => incoming.cmp(configured),
    }
}
