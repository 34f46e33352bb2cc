//! In-memory live point table for the scene engine
//!
//! This crate provides the PointStore, which tracks the current value of
//! every point the engine has seen and fires POINT_CHANGED events on the
//! event bus whenever a value is set or removed. In-process deployments use
//! it directly as the external point collaborator; hosts with their own
//! point space mirror changes into it.

use dashmap::DashMap;
use scenes_core::events::PointChangedData;
use scenes_core::{Context, PointId, PointSample, PointValue};
use scenes_event_bus::EventBus;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// The point store tracks all live point values
pub struct PointStore {
    /// All samples keyed by point id string
    points: DashMap<String, PointSample>,
    /// Event bus for firing change events
    event_bus: Arc<EventBus>,
}

impl PointStore {
    /// Create a new point store with the given event bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            points: DashMap::new(),
            event_bus,
        }
    }

    /// Set the value of a point
    ///
    /// If the point already has a sample, `last_changed` is only updated
    /// when the value actually changed. Fires a POINT_CHANGED event with
    /// the old and new sample.
    #[instrument(skip(self, value, context), fields(point_id = %point_id))]
    pub fn set(
        &self,
        point_id: PointId,
        value: PointValue,
        acknowledged: bool,
        context: Context,
    ) -> PointSample {
        let key = point_id.to_string();

        let old_sample = self.points.get(&key).map(|s| s.clone());

        let new_sample = match &old_sample {
            Some(existing) => existing.with_update(value, acknowledged, context.clone()),
            None => PointSample::new(point_id.clone(), value, acknowledged, context.clone()),
        };

        debug!(
            value = %new_sample.value,
            acknowledged,
            changed = old_sample
                .as_ref()
                .map(|s| s.value != new_sample.value)
                .unwrap_or(true),
            "Setting point value"
        );

        self.points.insert(key, new_sample.clone());

        let event_data = PointChangedData {
            point_id,
            old_sample,
            new_sample: Some(new_sample.clone()),
        };
        self.event_bus.fire_typed(event_data, context);

        new_sample
    }

    /// Get the current sample of a point
    pub fn get(&self, point_id: &PointId) -> Option<PointSample> {
        self.points.get(point_id.as_str()).map(|s| s.clone())
    }

    /// Get the current value of a point, or None if it has none
    pub fn get_value(&self, point_id: &PointId) -> Option<PointValue> {
        self.points
            .get(point_id.as_str())
            .map(|s| s.value.clone())
    }

    /// Get all point IDs with a current sample
    pub fn all_point_ids(&self) -> Vec<String> {
        self.points.iter().map(|r| r.key().clone()).collect()
    }

    /// Remove a point's sample
    ///
    /// Fires a POINT_CHANGED event with None for the new sample.
    #[instrument(skip(self, context), fields(point_id = %point_id))]
    pub fn remove(&self, point_id: &PointId, context: Context) -> Option<PointSample> {
        let old_sample = self.points.remove(point_id.as_str()).map(|(_, s)| s);

        if let Some(ref sample) = old_sample {
            trace!("Removing point sample");

            let event_data = PointChangedData {
                point_id: point_id.clone(),
                old_sample: Some(sample.clone()),
                new_sample: None,
            };
            self.event_bus.fire_typed(event_data, context);
        }

        old_sample
    }

    /// Get the total number of points
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Thread-safe wrapper for PointStore
pub type SharedPointStore = Arc<PointStore>;
