//! Engine error taxonomy
//!
//! Nothing here is fatal to the engine: every failure degrades to "this one
//! scene/member stays in its last known state" and is logged at the call
//! site that observed it.

use scenes_core::PointId;
use thiserror::Error;

use crate::port::PortError;

/// Scene engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// A `{{...}}` value indirection with nothing between the braces
    #[error("value reference is empty")]
    ReferenceEmpty,

    /// A `{{pointId}}` indirection pointing at a point with no current value
    #[error("referenced point {0} has no current value")]
    ReferenceMissing(PointId),

    /// A trigger condition string the engine does not recognize
    #[error("unsupported trigger condition: {0:?}")]
    UnsupportedCondition(String),

    /// Activation or feedback invoked against a scene that is no longer
    /// registered (races with reload)
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    /// Invalid scene configuration
    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),

    /// External collaborator failure
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
