//! End-to-end engine tests: trigger to writes to feedback

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use scenes_core::{Context, PointId, PointSample, PointValue, STATUS_UNCERTAIN};
use scenes_engine::{Direction, PointPort, PortError, SceneConfig, SceneEngine};
use scenes_event_bus::EventBus;
use scenes_point_store::PointStore;

/// Port wrapper that records every write in order, then applies it to the
/// backing store
struct RecordingPort {
    store: Arc<PointStore>,
    writes: Mutex<Vec<(String, PointValue)>>,
}

impl RecordingPort {
    fn new(store: Arc<PointStore>) -> Self {
        Self {
            store,
            writes: Mutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> Vec<(String, PointValue)> {
        self.writes.lock().unwrap().clone()
    }

    fn writes_to(&self, point: &str) -> Vec<PointValue> {
        self.writes()
            .into_iter()
            .filter(|(id, _)| id == point)
            .map(|(_, value)| value)
            .collect()
    }
}

#[async_trait]
impl PointPort for RecordingPort {
    async fn read_point(&self, point_id: &PointId) -> Result<Option<PointSample>, PortError> {
        Ok(self.store.get(point_id))
    }

    async fn write_point(
        &self,
        point_id: &PointId,
        value: PointValue,
        acknowledged: bool,
    ) -> Result<(), PortError> {
        self.writes
            .lock()
            .unwrap()
            .push((point_id.to_string(), value.clone()));
        self.store
            .set(point_id.clone(), value, acknowledged, Context::new());
        Ok(())
    }
}

fn configs(json: &str) -> Vec<SceneConfig> {
    serde_json::from_str(json).unwrap()
}

fn point(id: &str) -> PointId {
    PointId::new(id).unwrap()
}

async fn engine_with_recording_port() -> (Arc<SceneEngine>, Arc<RecordingPort>, Arc<PointStore>) {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let port = Arc::new(RecordingPort::new(store.clone()));
    let engine = Arc::new(SceneEngine::new(bus, port.clone()));
    (engine, port, store)
}

#[tokio::test]
async fn test_trigger_activates_and_writes_members() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [
                    {"id": "hall.light", "setIfTrue": true},
                    {"id": "hall.dimmer", "setIfTrue": 80}
                ],
                "onTrue": {"trigger": {"id": "hall.button", "value": true}}
            }]"#,
        ))
        .await;

    engine
        .handle_point_change(&point("hall.button"), Some(&PointValue::Bool(true)))
        .await;

    assert_eq!(port.writes_to("hall.light"), vec![PointValue::Bool(true)]);
    assert_eq!(port.writes_to("hall.dimmer"), vec![PointValue::Number(80.0)]);
    // Scene aggregate published after the members, acknowledged
    assert_eq!(
        port.writes_to("scene.evening"),
        vec![PointValue::Bool(true)]
    );
}

#[tokio::test]
async fn test_false_direction_writes_false_side() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [
                    {"id": "hall.light", "setIfTrue": true, "setIfFalse": false},
                    {"id": "hall.dimmer", "setIfTrue": 80}
                ],
                "onTrue": {"trigger": {"id": "hall.button", "value": true}},
                "onFalse": {"enabled": true, "trigger": {"id": "hall.button", "value": false}}
            }]"#,
        ))
        .await;

    engine
        .handle_point_change(&point("hall.button"), Some(&PointValue::Bool(false)))
        .await;

    assert_eq!(port.writes_to("hall.light"), vec![PointValue::Bool(false)]);
    // No false-side value configured for the dimmer: skipped silently
    assert!(port.writes_to("hall.dimmer").is_empty());
    // False branch enabled: the direction itself is published
    assert_eq!(
        port.writes_to("scene.evening"),
        vec![PointValue::Bool(false)]
    );
}

#[tokio::test]
async fn test_unmatched_trigger_does_nothing() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [{"id": "hall.light", "setIfTrue": true}],
                "onTrue": {"trigger": {"id": "hall.button", "condition": ">", "value": "5"}}
            }]"#,
        ))
        .await;

    engine
        .handle_point_change(&point("hall.button"), Some(&PointValue::from("3")))
        .await;
    assert!(port.writes().is_empty());

    engine
        .handle_point_change(&point("hall.button"), Some(&PointValue::from("10")))
        .await;
    assert_eq!(port.writes_to("hall.light"), vec![PointValue::Bool(true)]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_ordering() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.burst",
                "burstInterval": 100,
                "members": [
                    {"id": "out.one", "setIfTrue": 1},
                    {"id": "out.two", "setIfTrue": 2},
                    {"id": "out.three", "setIfTrue": 3}
                ]
            }]"#,
        ))
        .await;

    engine.activate("scene.burst", Direction::True).await;
    tokio::time::sleep(Duration::from_millis(350)).await;

    let order: Vec<String> = port.writes().into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec!["out.one", "out.two", "out.three", "scene.burst"]);
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_publishes_true_within_one_debounce() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let engine = Arc::new(SceneEngine::new(bus, store.clone()));
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [
                    {"id": "hall.light", "setIfTrue": true},
                    {"id": "hall.dimmer", "setIfTrue": 80}
                ],
                "onTrue": {"trigger": {"id": "hall.button", "value": true}}
            }]"#,
        ))
        .await;

    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;

    // Pressing the button activates the scene; the member writes feed back
    // through the store's change events into the feedback cycle
    store.set(
        point("hall.button"),
        PointValue::Bool(true),
        true,
        Context::new(),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        store.get_value(&point("hall.light")),
        Some(PointValue::Bool(true))
    );
    let status = store.get(&point("scene.evening")).unwrap();
    assert_eq!(status.value, PointValue::Bool(true));
    assert!(status.acknowledged);
}

#[tokio::test(start_paused = true)]
async fn test_feedback_follows_member_to_false() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let engine = Arc::new(SceneEngine::new(bus, store.clone()));
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [{"id": "hall.light", "setIfTrue": true, "setIfFalse": false}],
                "onTrue": {"trigger": {"id": "hall.button", "value": true}},
                "onFalse": {"enabled": true, "trigger": {"id": "hall.button", "value": false}}
            }]"#,
        ))
        .await;

    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;

    store.set(
        point("hall.button"),
        PointValue::Bool(true),
        true,
        Context::new(),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        store.get_value(&point("scene.evening")),
        Some(PointValue::Bool(true))
    );

    // Someone flips the light off by hand: the single member now matches
    // the false side, so the scene follows
    store.set(
        point("hall.light"),
        PointValue::Bool(false),
        true,
        Context::new(),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        store.get_value(&point("scene.evening")),
        Some(PointValue::Bool(false))
    );
}

#[tokio::test(start_paused = true)]
async fn test_partial_drift_publishes_uncertain() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let engine = Arc::new(SceneEngine::new(bus, store.clone()));
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [
                    {"id": "hall.a", "setIfTrue": true, "setIfFalse": false},
                    {"id": "hall.b", "setIfTrue": true, "setIfFalse": false}
                ],
                "onTrue": {"trigger": {"id": "hall.button", "value": true}},
                "onFalse": {"enabled": true, "trigger": {"id": "hall.button", "value": false}}
            }]"#,
        ))
        .await;

    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;

    store.set(
        point("hall.button"),
        PointValue::Bool(true),
        true,
        Context::new(),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;

    // One of the two members drifts: true no longer holds, false neither
    store.set(
        point("hall.a"),
        PointValue::Bool(false),
        true,
        Context::new(),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        store.get_value(&point("scene.evening")),
        Some(PointValue::from(STATUS_UNCERTAIN))
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_delays_cancels_pending_write() {
    let (engine, port, store) = engine_with_recording_port().await;
    store.set(
        point("src.value"),
        PointValue::Number(10.0),
        true,
        Context::new(),
    );
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.delayed",
                "members": [{
                    "id": "out.p",
                    "setIfTrue": "{{src.value}}",
                    "delay": 500,
                    "stopAllDelays": true
                }]
            }]"#,
        ))
        .await;

    engine.activate("scene.delayed", Direction::True).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Second activation before the first delayed write fires cancels it
    store.set(
        point("src.value"),
        PointValue::Number(20.0),
        true,
        Context::new(),
    );
    engine.activate("scene.delayed", Direction::True).await;
    tokio::time::sleep(Duration::from_millis(1000)).await;

    // The first pending write (value 10) must never have been applied
    assert_eq!(port.writes_to("out.p"), vec![PointValue::Number(20.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_reload_cancels_outstanding_work() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.delayed",
                "members": [{"id": "out.p", "setIfTrue": 1, "delay": 500}]
            }]"#,
        ))
        .await;

    engine.activate("scene.delayed", Direction::True).await;
    engine.load_scenes(Vec::new()).await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(port.writes_to("out.p").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stacked_delays_honored_through_dispatch() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.stacked",
                "members": [
                    {"id": "out.a", "setIfTrue": 1, "delay": 100, "stackNextDelays": true},
                    {"id": "out.b", "setIfTrue": 2, "delay": 100}
                ]
            }]"#,
        ))
        .await;

    engine.activate("scene.stacked", Direction::True).await;

    // out.a fires at 100ms, out.b at 100 (carry) + 100 (own) = 200ms
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(port.writes_to("out.a"), vec![PointValue::Number(1.0)]);
    assert!(port.writes_to("out.b").is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(port.writes_to("out.b"), vec![PointValue::Number(2.0)]);
}

#[tokio::test]
async fn test_do_not_overwrite_skips_matching_value() {
    let (engine, port, store) = engine_with_recording_port().await;
    store.set(
        point("out.p"),
        PointValue::Bool(true),
        true,
        Context::new(),
    );
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.careful",
                "members": [{"id": "out.p", "setIfTrue": true, "doNotOverwrite": true}]
            }]"#,
        ))
        .await;

    engine.activate("scene.careful", Direction::True).await;
    assert!(port.writes_to("out.p").is_empty());
    // The scene status is still published
    assert_eq!(
        port.writes_to("scene.careful"),
        vec![PointValue::Bool(true)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_virtual_group_tracks_member_average() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let engine = Arc::new(SceneEngine::new(bus, store.clone()));
    engine
        .load_scenes(configs(
            r#"[{
                "id": "group.temps",
                "virtualGroup": true,
                "aggregation": "avg",
                "members": [
                    {"id": "t.one"},
                    {"id": "t.two"},
                    {"id": "t.three"}
                ]
            }]"#,
        ))
        .await;

    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });
    tokio::task::yield_now().await;

    for (id, value) in [("t.one", 2.0), ("t.two", 4.0), ("t.three", 6.0)] {
        store.set(point(id), PointValue::Number(value), true, Context::new());
    }
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        store.get_value(&point("group.temps")),
        Some(PointValue::Number(4.0))
    );
}

#[tokio::test]
async fn test_virtual_group_activation_publishes_direction() {
    let (engine, port, _store) = engine_with_recording_port().await;
    engine
        .load_scenes(configs(
            r#"[{
                "id": "group.lights",
                "virtualGroup": true,
                "aggregation": "any",
                "members": [{"id": "l.one"}, {"id": "l.two"}],
                "onFalse": {"enabled": true}
            }]"#,
        ))
        .await;

    engine.activate("group.lights", Direction::False).await;

    // No member values asserted, only the aggregate itself
    assert_eq!(
        port.writes(),
        vec![("group.lights".to_string(), PointValue::Bool(false))]
    );
}

#[tokio::test]
async fn test_load_primes_actuals_from_live_points() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(PointStore::new(bus.clone()));
    let engine = Arc::new(SceneEngine::new(bus, store.clone()));

    store.set(
        point("hall.light"),
        PointValue::Bool(true),
        true,
        Context::new(),
    );
    engine
        .load_scenes(configs(
            r#"[{
                "id": "scene.evening",
                "members": [{"id": "hall.light", "setIfTrue": true}]
            }]"#,
        ))
        .await;

    let scene = engine.registry().get("scene.evening").await.unwrap();
    assert_eq!(scene.members[0].actual, Some(PointValue::Bool(true)));
}
