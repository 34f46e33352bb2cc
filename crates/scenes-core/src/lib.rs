//! Core types for the scene engine
//!
//! This crate provides the fundamental types used throughout the scene
//! engine: PointId, PointValue, PointSample, Event, and Context.

mod context;
mod event;
mod point_id;
mod sample;
mod value;

pub use context::Context;
pub use event::{Event, EventData, EventType};
pub use point_id::{PointId, PointIdError};
pub use sample::PointSample;
pub use value::{clean_number, PointValue};

/// Sentinel status published when a scene's members disagree beyond what
/// its aggregation mode can resolve
pub const STATUS_UNCERTAIN: &str = "uncertain";

/// Standard event types used by the scene engine
pub mod events {
    use super::*;

    /// Event type for point changes
    pub const POINT_CHANGED: &str = "point_changed";

    /// Event type fired after a full scene reload
    pub const SCENES_RELOADED: &str = "scenes_reloaded";

    /// Data for POINT_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct PointChangedData {
        pub point_id: PointId,
        pub old_sample: Option<PointSample>,
        pub new_sample: Option<PointSample>,
    }

    impl EventData for PointChangedData {
        fn event_type() -> &'static str {
            POINT_CHANGED
        }
    }

    /// Data for SCENES_RELOADED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct ScenesReloadedData {
        pub scene_count: usize,
    }

    impl EventData for ScenesReloadedData {
        fn event_type() -> &'static str {
            SCENES_RELOADED
        }
    }
}
