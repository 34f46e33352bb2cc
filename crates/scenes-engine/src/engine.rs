//! Engine orchestration
//!
//! The `SceneEngine` wires the registry, dispatcher, aggregator and cron
//! scheduler together and drives them from point change events. Data flow
//! for one delivered change: refresh member actuals, arm the feedback
//! debounce for every scene the point belongs to, then evaluate the
//! point's trigger registrations and activate matching scenes.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use scenes_core::events::{PointChangedData, ScenesReloadedData};
use scenes_core::{Context, PointId, PointValue};
use scenes_event_bus::EventBus;

use crate::aggregator::FeedbackAggregator;
use crate::dispatcher::CommandDispatcher;
use crate::port::PointPort;
use crate::registry::SceneRegistry;
use crate::scene::SceneConfig;
use crate::schedule::{Activation, CronScheduler};
use crate::trigger::Direction;
use crate::trigger_eval;

/// The scene engine
pub struct SceneEngine {
    bus: Arc<EventBus>,
    port: Arc<dyn PointPort>,
    registry: Arc<SceneRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    aggregator: Arc<FeedbackAggregator>,
    scheduler: CronScheduler,
    /// Cron fire channel, consumed once by `run`
    activations: Mutex<Option<mpsc::UnboundedReceiver<Activation>>>,
}

impl SceneEngine {
    /// Create an engine reading and writing points through the given port
    pub fn new(bus: Arc<EventBus>, port: Arc<dyn PointPort>) -> Self {
        let registry = Arc::new(SceneRegistry::new());
        let dispatcher = Arc::new(CommandDispatcher::new(port.clone(), registry.clone()));
        let aggregator = Arc::new(FeedbackAggregator::new(port.clone(), registry.clone()));
        let (scheduler, activations) = CronScheduler::new();

        Self {
            bus,
            port,
            registry,
            dispatcher,
            aggregator,
            scheduler,
            activations: Mutex::new(Some(activations)),
        }
    }

    /// The scene registry
    pub fn registry(&self) -> &Arc<SceneRegistry> {
        &self.registry
    }

    /// Load (or reload) the engine from a configuration snapshot
    ///
    /// Outstanding timers, pending delayed writes and cron jobs from the
    /// previous configuration are cancelled unconditionally, the registry
    /// is rebuilt wholesale, member actuals are primed from the live point
    /// space and the cron jobs are reinstalled. Returns the number of
    /// scenes loaded.
    pub async fn load_scenes(&self, configs: Vec<SceneConfig>) -> usize {
        self.dispatcher.cancel_all();
        self.aggregator.cancel_all();
        self.scheduler.cancel_all();

        let scene_count = self.registry.load(configs).await;

        for point in self.registry.member_points().await {
            match self.port.read_point(&point).await {
                Ok(sample) => {
                    let value = sample.map(|s| s.value);
                    self.registry.update_actual(&point, value).await;
                }
                Err(e) => {
                    warn!(point = %point, error = %e, "Could not prime member actual");
                }
            }
        }

        self.scheduler.install(self.registry.cron_specs().await);

        info!(scene_count, "Scenes loaded");
        self.bus
            .fire_typed(ScenesReloadedData { scene_count }, Context::new());

        scene_count
    }

    /// Drop all scenes and cancel all outstanding work
    pub async fn reset(&self) {
        self.dispatcher.cancel_all();
        self.aggregator.cancel_all();
        self.scheduler.cancel_all();
        self.registry.clear().await;
        info!("Engine reset");
    }

    /// Activate a scene in a direction
    ///
    /// Activation is fire-and-forget: failures are logged and the engine
    /// keeps running.
    pub async fn activate(&self, scene_id: &str, direction: Direction) {
        if let Err(e) = self.dispatcher.activate(scene_id, direction).await {
            error!(scene = scene_id, error = %e, "Scene activation failed");
        }
    }

    /// React to one delivered point change
    ///
    /// `new_value` is None when the point's sample was removed; the change
    /// still refreshes actuals and arms feedback, but triggers only
    /// evaluate against an actual value.
    pub async fn handle_point_change(&self, point_id: &PointId, new_value: Option<&PointValue>) {
        self.registry
            .update_actual(point_id, new_value.cloned())
            .await;

        for scene_id in self.registry.scenes_for_point(point_id).await {
            self.aggregator.schedule(&scene_id);
        }

        let Some(value) = new_value else {
            return;
        };

        for (scene_id, direction) in self.registry.triggers_for_point(point_id).await {
            let Some(scene) = self.registry.get(&scene_id).await else {
                continue;
            };
            match trigger_eval::matches(scene.trigger(direction), point_id, value) {
                Ok(true) => {
                    debug!(
                        scene = %scene_id,
                        point = %point_id,
                        direction = %direction,
                        "Trigger matched"
                    );
                    self.activate(&scene_id, direction).await;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(scene = %scene_id, point = %point_id, error = %e, "Trigger not evaluated");
                }
            }
        }
    }

    /// Drive the engine from the event bus until it closes
    ///
    /// Consumes point change events and cron fires. Can only be started
    /// once per engine instance.
    pub async fn run(&self) {
        let receiver = self.activations.lock().unwrap().take();
        let Some(mut activations) = receiver else {
            error!("Engine is already running");
            return;
        };

        let mut changes = self.bus.subscribe_typed::<PointChangedData>();
        info!("Scene engine running");

        loop {
            tokio::select! {
                event = changes.recv() => match event {
                    Ok(event) => {
                        let value = event.data.new_sample.as_ref().map(|s| &s.value);
                        self.handle_point_change(&event.data.point_id, value).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Point change receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                activation = activations.recv() => match activation {
                    Some(activation) => {
                        debug!(
                            scene = %activation.scene_id,
                            direction = %activation.direction,
                            "Cron fired"
                        );
                        self.activate(&activation.scene_id, activation.direction)
                            .await;
                    }
                    None => break,
                },
            }
        }

        info!("Scene engine stopped");
    }
}
