//! Scene registry: the engine's single owned state
//!
//! All mutable engine state (the scene map and the reverse lookup indices:
//! which scenes care about point P, which scenes trigger on point P)
//! lives in one struct behind one lock, rebuilt wholesale on every load and
//! cleared wholesale on reset. Async callbacks scheduled against a scene
//! must re-validate through here before acting, since the scene may have
//! been dropped by a reload in between.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use scenes_core::{PointId, PointValue};

use crate::scene::{Scene, SceneConfig, SceneStatus};
use crate::trigger::Direction;

#[derive(Default)]
struct EngineState {
    /// All active scenes by id
    scenes: HashMap<String, Scene>,
    /// point id -> scenes that have it as a member
    member_index: HashMap<String, Vec<String>>,
    /// point id -> (scene, direction) pairs watching it as a trigger
    trigger_index: HashMap<String, Vec<(String, Direction)>>,
}

/// In-memory index of active scenes and their reverse lookups
pub struct SceneRegistry {
    state: RwLock<EngineState>,
}

impl SceneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Replace the registry contents from a configuration snapshot
    ///
    /// Disabled scenes are dropped here: they install no indices, no
    /// triggers, and can never activate. Returns the number of scenes
    /// loaded.
    pub async fn load(&self, configs: Vec<SceneConfig>) -> usize {
        let mut state = self.state.write().await;
        *state = EngineState::default();

        for config in configs {
            if !config.enabled {
                debug!(scene = %config.id, "Dropping disabled scene");
                continue;
            }

            let scene = Scene::from_config(config);
            let scene_id = scene.id.to_string();

            for member in &scene.members {
                let scenes = state
                    .member_index
                    .entry(member.point.to_string())
                    .or_default();
                if !scenes.contains(&scene_id) {
                    scenes.push(scene_id.clone());
                }
            }

            for direction in [Direction::True, Direction::False] {
                let spec = scene.trigger(direction);
                if !spec.enabled {
                    continue;
                }
                if let Some(trigger) = &spec.trigger {
                    state
                        .trigger_index
                        .entry(trigger.id.to_string())
                        .or_default()
                        .push((scene_id.clone(), direction));
                }
            }

            info!(scene = %scene.id, name = scene.display_name(), "Loaded scene");
            state.scenes.insert(scene_id, scene);
        }

        state.scenes.len()
    }

    /// Drop all scenes and indices
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = EngineState::default();
    }

    /// Get a snapshot of a scene by id
    pub async fn get(&self, scene_id: &str) -> Option<Scene> {
        self.state.read().await.scenes.get(scene_id).cloned()
    }

    /// Check whether a scene is still registered
    pub async fn contains(&self, scene_id: &str) -> bool {
        self.state.read().await.scenes.contains_key(scene_id)
    }

    /// Number of active scenes
    pub async fn count(&self) -> usize {
        self.state.read().await.scenes.len()
    }

    /// Scenes that have the given point as a member
    pub async fn scenes_for_point(&self, point_id: &PointId) -> Vec<String> {
        self.state
            .read()
            .await
            .member_index
            .get(point_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// (scene, direction) pairs triggering on the given point
    pub async fn triggers_for_point(&self, point_id: &PointId) -> Vec<(String, Direction)> {
        self.state
            .read()
            .await
            .trigger_index
            .get(point_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// All distinct member points across active scenes
    pub async fn member_points(&self) -> Vec<PointId> {
        self.state
            .read()
            .await
            .member_index
            .keys()
            .filter_map(|k| PointId::new(k.clone()).ok())
            .collect()
    }

    /// All installed cron schedules as (scene, direction, expression)
    pub async fn cron_specs(&self) -> Vec<(String, Direction, String)> {
        let state = self.state.read().await;
        let mut specs = Vec::new();
        for (id, scene) in &state.scenes {
            for direction in [Direction::True, Direction::False] {
                let spec = scene.trigger(direction);
                if spec.enabled {
                    if let Some(expr) = &spec.cron {
                        specs.push((id.clone(), direction, expr.clone()));
                    }
                }
            }
        }
        specs
    }

    /// Refresh the tracked actual of every member bound to this point
    ///
    /// Must run before feedback aggregation is scheduled for a delivered
    /// change.
    pub async fn update_actual(&self, point_id: &PointId, value: Option<PointValue>) {
        let mut state = self.state.write().await;
        let Some(scene_ids) = state.member_index.get(point_id.as_str()).cloned() else {
            return;
        };
        for scene_id in scene_ids {
            if let Some(scene) = state.scenes.get_mut(&scene_id) {
                for member in &mut scene.members {
                    if member.point == *point_id {
                        member.actual = value.clone();
                    }
                }
            }
        }
    }

    /// Whether publishing this value would change the scene's visible
    /// status (value differs, or the previous publish wasn't acknowledged)
    ///
    /// Returns None when the scene is no longer registered.
    pub async fn status_needs_publish(&self, scene_id: &str, value: &PointValue) -> Option<bool> {
        let state = self.state.read().await;
        let scene = state.scenes.get(scene_id)?;
        Some(scene.status.value.as_ref() != Some(value) || !scene.status.acknowledged)
    }

    /// Record the scene status that was just published
    pub async fn record_status(&self, scene_id: &str, value: PointValue, acknowledged: bool) {
        let mut state = self.state.write().await;
        if let Some(scene) = state.scenes.get_mut(scene_id) {
            scene.status = SceneStatus {
                value: Some(value),
                acknowledged,
            };
        }
    }
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::new()
    }
}
