//! Scene Engine
//!
//! This crate provides the scene evaluation and activation engine. A scene
//! is a named set of desired point values plus trigger and feedback rules;
//! the engine watches the point space, activates scenes when their triggers
//! match, writes the configured member values (staggered and delayed as
//! configured) and keeps each scene's own status point reconciled against
//! the members' live values.
//!
//! # Architecture
//!
//! ```text
//! point change → registry lookup → feedback debounce (always)
//!                                → trigger match → dispatch → point writes
//! ```
//!
//! # Key Types
//!
//! - [`SceneEngine`] - Orchestrates the whole pipeline
//! - [`SceneRegistry`] - In-memory index of active scenes
//! - [`CommandDispatcher`] - Turns activations into member writes
//! - [`FeedbackAggregator`] - Debounced status reconciliation
//! - [`PointPort`] - Abstraction over the external point space

pub mod aggregator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod port;
pub mod registry;
pub mod resolver;
pub mod scene;
pub mod schedule;
pub mod trigger;
pub mod trigger_eval;

mod status;

pub use aggregator::{FeedbackAggregator, DEBOUNCE_MS};
pub use dispatcher::CommandDispatcher;
pub use engine::SceneEngine;
pub use error::{EngineError, EngineResult};
pub use port::{PointPort, PortError};
pub use registry::SceneRegistry;
pub use resolver::ValueResolver;
pub use scene::{Aggregation, Member, MemberConfig, Scene, SceneConfig, SceneStatus};
pub use schedule::{Activation, CronScheduler};
pub use trigger::{Direction, PointTrigger, TriggerOp, TriggerSpec};
