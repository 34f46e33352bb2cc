//! External point collaborator interface
//!
//! The engine never talks to devices directly: it reads and writes points
//! through this trait. In-process deployments hand it the PointStore; hosts
//! with their own point space implement it against that.

use async_trait::async_trait;
use scenes_core::{Context, PointId, PointSample, PointValue};
use scenes_point_store::PointStore;
use thiserror::Error;

/// Errors from the external point collaborator
#[derive(Debug, Error)]
pub enum PortError {
    #[error("read of point {0} failed: {1}")]
    Read(PointId, String),

    #[error("write to point {0} rejected: {1}")]
    Write(PointId, String),
}

/// Abstracted access to the host's point space
///
/// Both operations are asynchronous: each read/write is a suspension point
/// and may complete out of order relative to other members' writes.
#[async_trait]
pub trait PointPort: Send + Sync {
    /// Read the current sample of a point, or None if it has none
    async fn read_point(&self, point_id: &PointId) -> Result<Option<PointSample>, PortError>;

    /// Write a value to a point with the given acknowledgement flag
    async fn write_point(
        &self,
        point_id: &PointId,
        value: PointValue,
        acknowledged: bool,
    ) -> Result<(), PortError>;
}

#[async_trait]
impl PointPort for PointStore {
    async fn read_point(&self, point_id: &PointId) -> Result<Option<PointSample>, PortError> {
        Ok(self.get(point_id))
    }

    async fn write_point(
        &self,
        point_id: &PointId,
        value: PointValue,
        acknowledged: bool,
    ) -> Result<(), PortError> {
        self.set(point_id.clone(), value, acknowledged, Context::new());
        Ok(())
    }
}
