//! Scene status publishing
//!
//! Both the dispatcher (on activation) and the feedback aggregator (on
//! recomputation) publish through here: the scene's own point receives the
//! aggregate value, acknowledged, but only when it differs from what was
//! last published or the last publish wasn't acknowledged.

use std::sync::Arc;

use tracing::{debug, error, trace};

use scenes_core::{PointId, PointValue};

use crate::port::PointPort;
use crate::registry::SceneRegistry;

pub(crate) async fn publish_status(
    registry: &SceneRegistry,
    port: &Arc<dyn PointPort>,
    scene_id: &PointId,
    value: PointValue,
) {
    match registry
        .status_needs_publish(scene_id.as_str(), &value)
        .await
    {
        None => {
            debug!(scene = %scene_id, "Scene no longer registered, not publishing status");
        }
        Some(false) => {
            trace!(scene = %scene_id, value = %value, "Scene status unchanged");
        }
        Some(true) => {
            debug!(scene = %scene_id, value = %value, "Publishing scene status");
            match port.write_point(scene_id, value.clone(), true).await {
                Ok(()) => {
                    registry
                        .record_status(scene_id.as_str(), value, true)
                        .await;
                }
                Err(e) => {
                    error!(scene = %scene_id, error = %e, "Scene status write rejected");
                }
            }
        }
    }
}
