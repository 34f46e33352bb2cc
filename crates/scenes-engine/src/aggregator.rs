//! Feedback aggregation
//!
//! Recomputes a scene's live status from the tracked `actual` of each
//! member, debounced per scene: the first relevant change arms a single
//! timer, later changes coalesce into it, and the recomputation reads
//! then-current actuals when the timer fires 200ms later.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use scenes_core::{PointValue, STATUS_UNCERTAIN};

use crate::port::PointPort;
use crate::registry::SceneRegistry;
use crate::resolver::ValueResolver;
use crate::scene::{Aggregation, Member, Scene};
use crate::status::publish_status;
use crate::trigger::Direction;

/// Delay between the first unconsumed member change and the recomputation
pub const DEBOUNCE_MS: u64 = 200;

/// Debounced per-scene status reconciliation
pub struct FeedbackAggregator {
    registry: Arc<SceneRegistry>,
    port: Arc<dyn PointPort>,
    resolver: ValueResolver,
    /// Armed debounce timers by scene id; presence means a recomputation
    /// is already pending
    timers: DashMap<String, JoinHandle<()>>,
}

impl FeedbackAggregator {
    pub fn new(port: Arc<dyn PointPort>, registry: Arc<SceneRegistry>) -> Self {
        Self {
            registry,
            resolver: ValueResolver::new(port.clone()),
            port,
            timers: DashMap::new(),
        }
    }

    /// Arm (or coalesce into) the scene's debounce timer
    pub fn schedule(self: &Arc<Self>, scene_id: &str) {
        match self.timers.entry(scene_id.to_string()) {
            Entry::Occupied(_) => {
                trace!(scene = scene_id, "Recomputation already pending, coalescing");
            }
            Entry::Vacant(slot) => {
                let this = Arc::clone(self);
                let id = scene_id.to_string();
                slot.insert(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
                    this.timers.remove(&id);
                    this.recompute(&id).await;
                }));
            }
        }
    }

    /// Recompute and publish a scene's status from current actuals
    pub async fn recompute(&self, scene_id: &str) {
        let Some(scene) = self.registry.get(scene_id).await else {
            debug!(scene = scene_id, "Scene dropped before recomputation");
            return;
        };

        let status = if scene.virtual_group {
            fold_virtual(&scene.members, scene.aggregation)
        } else {
            self.regular_status(&scene).await
        };

        if let Some(value) = status {
            publish_status(&self.registry, &self.port, &scene.id, value).await;
        }
    }

    /// Status of a regular scene: does the live state match the true-side
    /// (and, with the false branch enabled, the false-side) set values?
    ///
    /// A member whose set value fails to resolve is logged and skipped for
    /// this pass; it neither confirms nor disqualifies.
    async fn regular_status(&self, scene: &Scene) -> Option<PointValue> {
        let active_true = self.direction_active(scene, Direction::True).await;

        if !scene.on_false.enabled {
            return active_true.map(PointValue::Bool);
        }

        let active_false = self.direction_active(scene, Direction::False).await;

        let value = if active_true == Some(true) {
            PointValue::Bool(true)
        } else if active_false == Some(true) {
            PointValue::Bool(false)
        } else {
            PointValue::from(STATUS_UNCERTAIN)
        };
        Some(value)
    }

    /// Whether every member with a set value for this direction currently
    /// matches it; None when no member contributes
    async fn direction_active(&self, scene: &Scene, direction: Direction) -> Option<bool> {
        let mut active = None;
        for member in &scene.members {
            let Some(spec) = member.set_value(direction) else {
                continue;
            };
            let desired = match self.resolver.resolve(spec).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        scene = %scene.id,
                        point = %member.point,
                        error = %e,
                        "Could not resolve set value during feedback, skipping member"
                    );
                    continue;
                }
            };
            if desired.is_null() {
                continue;
            }

            let matched = member_matches(member, &desired, direction);
            active = Some(active.unwrap_or(true) && matched);
        }
        active
    }

    /// Abort all armed debounce timers
    ///
    /// Called on engine reset/reload.
    pub fn cancel_all(&self) {
        let scenes: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for scene in scenes {
            if let Some((_, handle)) = self.timers.remove(&scene) {
                handle.abort();
            }
        }
    }
}

/// Does the member's actual match the desired value?
///
/// With a tolerance configured both sides coerce numerically (non-numeric
/// treated as 0) and must lie within it; without one, loose equality.
fn member_matches(member: &Member, desired: &PointValue, direction: Direction) -> bool {
    let Some(actual) = &member.actual else {
        return false;
    };
    match member.tolerance(direction) {
        Some(tolerance) => (desired.to_number() - actual.to_number()).abs() <= tolerance,
        None => actual.loose_eq(desired),
    }
}

/// Fold a virtual group's member actuals into one aggregate value
///
/// Returns None when nothing contributes (no actuals yet, or no
/// numerically-compatible ones for `avg`).
pub(crate) fn fold_virtual(members: &[Member], aggregation: Aggregation) -> Option<PointValue> {
    let actuals = members.iter().filter_map(|m| m.actual.as_ref());

    match aggregation {
        Aggregation::Any => {
            // First wins unless it is falsy and a later one is truthy
            let mut result: Option<&PointValue> = None;
            for actual in actuals {
                match result {
                    None => result = Some(actual),
                    Some(current) if !current.is_truthy() && actual.is_truthy() => {
                        result = Some(actual)
                    }
                    Some(_) => {}
                }
            }
            result.cloned()
        }
        Aggregation::Min => actuals
            .map(PointValue::to_number)
            .fold(None, |min: Option<f64>, n| {
                Some(min.map_or(n, |m| m.min(n)))
            })
            .map(PointValue::Number),
        Aggregation::Max => actuals
            .map(PointValue::to_number)
            .fold(None, |max: Option<f64>, n| {
                Some(max.map_or(n, |m| m.max(n)))
            })
            .map(PointValue::Number),
        Aggregation::Avg => {
            let numeric: Vec<f64> = actuals.filter_map(PointValue::as_f64).collect();
            if numeric.is_empty() {
                None
            } else {
                Some(PointValue::Number(
                    numeric.iter().sum::<f64>() / numeric.len() as f64,
                ))
            }
        }
        Aggregation::Uncertain => {
            // Members must agree; any disagreement is sticky
            let mut agreed: Option<&PointValue> = None;
            for actual in actuals {
                match agreed {
                    None => agreed = Some(actual),
                    Some(current) if current.loose_eq(actual) => {}
                    Some(_) => return Some(PointValue::from(STATUS_UNCERTAIN)),
                }
            }
            agreed.cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenes_core::PointId;
    use scenes_event_bus::EventBus;
    use scenes_point_store::PointStore;

    use crate::scene::SceneConfig;

    fn member_with_actual(actual: Option<PointValue>) -> Member {
        Member {
            point: PointId::new("p.x").unwrap(),
            set_if_true: None,
            set_if_false: None,
            set_if_true_tolerance: None,
            set_if_false_tolerance: None,
            delay: 0,
            stack_next_delays: false,
            stop_all_delays: false,
            do_not_overwrite: false,
            ack_true: false,
            actual,
        }
    }

    fn members(actuals: &[PointValue]) -> Vec<Member> {
        actuals
            .iter()
            .map(|a| member_with_actual(Some(a.clone())))
            .collect()
    }

    #[test]
    fn test_avg_fold() {
        let members = members(&[
            PointValue::Number(2.0),
            PointValue::Number(4.0),
            PointValue::Number(6.0),
        ]);
        assert_eq!(
            fold_virtual(&members, Aggregation::Avg),
            Some(PointValue::Number(4.0))
        );
    }

    #[test]
    fn test_avg_skips_non_numeric() {
        let members = members(&[
            PointValue::Number(2.0),
            PointValue::from("warm"),
            PointValue::Number(4.0),
        ]);
        assert_eq!(
            fold_virtual(&members, Aggregation::Avg),
            Some(PointValue::Number(3.0))
        );
    }

    #[test]
    fn test_min_max_coerce_non_numeric_to_zero() {
        let members = members(&[PointValue::Number(5.0), PointValue::from("warm")]);
        assert_eq!(
            fold_virtual(&members, Aggregation::Min),
            Some(PointValue::Number(0.0))
        );
        assert_eq!(
            fold_virtual(&members, Aggregation::Max),
            Some(PointValue::Number(5.0))
        );
    }

    #[test]
    fn test_any_prefers_first_truthy() {
        let bools = members(&[
            PointValue::Bool(false),
            PointValue::Bool(true),
            PointValue::Bool(false),
        ]);
        assert_eq!(
            fold_virtual(&bools, Aggregation::Any),
            Some(PointValue::Bool(true))
        );

        let numbers = members(&[PointValue::Number(7.0), PointValue::Number(3.0)]);
        assert_eq!(
            fold_virtual(&numbers, Aggregation::Any),
            Some(PointValue::Number(7.0))
        );
    }

    #[test]
    fn test_uncertain_is_sticky_on_disagreement() {
        let agreeing = members(&[PointValue::Bool(true), PointValue::from("true")]);
        assert_eq!(
            fold_virtual(&agreeing, Aggregation::Uncertain),
            Some(PointValue::Bool(true))
        );

        let disagreeing = members(&[
            PointValue::Bool(true),
            PointValue::Bool(false),
            PointValue::Bool(true),
        ]);
        assert_eq!(
            fold_virtual(&disagreeing, Aggregation::Uncertain),
            Some(PointValue::from(STATUS_UNCERTAIN))
        );
    }

    #[test]
    fn test_fold_with_no_actuals() {
        let members = vec![member_with_actual(None), member_with_actual(None)];
        for aggregation in [
            Aggregation::Any,
            Aggregation::Min,
            Aggregation::Max,
            Aggregation::Avg,
            Aggregation::Uncertain,
        ] {
            assert_eq!(fold_virtual(&members, aggregation), None);
        }
    }

    fn harness() -> (Arc<FeedbackAggregator>, Arc<SceneRegistry>, Arc<PointStore>) {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(PointStore::new(bus));
        let registry = Arc::new(SceneRegistry::new());
        let aggregator = Arc::new(FeedbackAggregator::new(store.clone(), registry.clone()));
        (aggregator, registry, store)
    }

    async fn load_scene(registry: &SceneRegistry, json: &str) {
        let config: SceneConfig = serde_json::from_str(json).unwrap();
        registry.load(vec![config]).await;
    }

    #[tokio::test]
    async fn test_tolerance_keeps_active_true() {
        let (aggregator, registry, store) = harness();
        load_scene(
            &registry,
            r#"{
                "id": "scene.dim",
                "members": [
                    {"id": "hall.dimmer", "setIfTrue": 80, "setIfTrueTolerance": 5}
                ]
            }"#,
        )
        .await;

        let dimmer = PointId::new("hall.dimmer").unwrap();
        registry
            .update_actual(&dimmer, Some(PointValue::Number(77.0)))
            .await;

        aggregator.recompute("scene.dim").await;
        let status = store.get_value(&PointId::new("scene.dim").unwrap());
        assert_eq!(status, Some(PointValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_exact_mismatch_without_tolerance() {
        let (aggregator, registry, store) = harness();
        load_scene(
            &registry,
            r#"{
                "id": "scene.dim",
                "members": [{"id": "hall.dimmer", "setIfTrue": 80}]
            }"#,
        )
        .await;

        let dimmer = PointId::new("hall.dimmer").unwrap();
        registry
            .update_actual(&dimmer, Some(PointValue::Number(77.0)))
            .await;

        aggregator.recompute("scene.dim").await;
        let status = store.get_value(&PointId::new("scene.dim").unwrap());
        assert_eq!(status, Some(PointValue::Bool(false)));
    }

    #[tokio::test]
    async fn test_false_branch_uncertain_between_states() {
        let (aggregator, registry, store) = harness();
        load_scene(
            &registry,
            r#"{
                "id": "scene.hall",
                "members": [
                    {"id": "hall.a", "setIfTrue": true, "setIfFalse": false},
                    {"id": "hall.b", "setIfTrue": true, "setIfFalse": false}
                ],
                "onFalse": {"enabled": true}
            }"#,
        )
        .await;

        registry
            .update_actual(&PointId::new("hall.a").unwrap(), Some(PointValue::Bool(true)))
            .await;
        registry
            .update_actual(&PointId::new("hall.b").unwrap(), Some(PointValue::Bool(false)))
            .await;

        aggregator.recompute("scene.hall").await;
        assert_eq!(
            store.get_value(&PointId::new("scene.hall").unwrap()),
            Some(PointValue::from(STATUS_UNCERTAIN))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_rapid_changes() {
        let (aggregator, registry, store) = harness();
        load_scene(
            &registry,
            r#"{
                "id": "scene.dim",
                "members": [{"id": "hall.dimmer", "setIfTrue": 80}]
            }"#,
        )
        .await;

        let dimmer = PointId::new("hall.dimmer").unwrap();

        // Three rapid changes within the window; the recomputation fires
        // once and sees the value current at fire time
        for value in [20.0, 50.0, 80.0] {
            registry
                .update_actual(&dimmer, Some(PointValue::Number(value)))
                .await;
            aggregator.schedule("scene.dim");
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        tokio::time::advance(Duration::from_millis(DEBOUNCE_MS)).await;
        tokio::task::yield_now().await;

        let scene_point = PointId::new("scene.dim").unwrap();
        let sample = store.get(&scene_point).unwrap();
        // The single recomputation saw the final actual (80, a match)
        assert_eq!(sample.value, PointValue::Bool(true));
        assert!(sample.acknowledged);
    }
}
