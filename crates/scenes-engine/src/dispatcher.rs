//! Command dispatch
//!
//! Turns an activation intent (scene, direction) into writes against the
//! member points: burst-interval staggering between members, per-member
//! stacked delays, pending-write cancellation (`stopAllDelays`) and
//! read-before-write suppression (`doNotOverwrite`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use scenes_core::{PointId, PointValue};

use crate::error::{EngineError, EngineResult};
use crate::port::PointPort;
use crate::registry::SceneRegistry;
use crate::resolver::ValueResolver;
use crate::scene::Member;
use crate::status::publish_status;
use crate::trigger::Direction;

/// A delayed write that has been scheduled but not yet applied
///
/// The token distinguishes writes issued in the same burst so cancellation
/// and self-removal touch only their own entry, never a later one.
struct PendingWrite {
    token: u64,
    handle: JoinHandle<()>,
}

/// Dispatches scene activations to member point writes
pub struct CommandDispatcher {
    port: Arc<dyn PointPort>,
    registry: Arc<SceneRegistry>,
    resolver: ValueResolver,
    /// Pending delayed writes keyed by target point
    pending: Arc<DashMap<String, Vec<PendingWrite>>>,
    /// In-flight burst stagger tasks
    bursts: Mutex<Vec<JoinHandle<()>>>,
    /// Monotonic token generator for pending-write disambiguation
    next_token: AtomicU64,
}

impl CommandDispatcher {
    /// Create a new dispatcher writing through the given port
    pub fn new(port: Arc<dyn PointPort>, registry: Arc<SceneRegistry>) -> Self {
        Self {
            resolver: ValueResolver::new(port.clone()),
            port,
            registry,
            pending: Arc::new(DashMap::new()),
            bursts: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Activate a scene in the given direction
    ///
    /// For a virtual group the direction itself becomes the scene's
    /// aggregate value. For a regular scene each member is asked, in
    /// configured order, to execute its direction-side set value; with a
    /// burst interval the members are staggered on a background task and
    /// the scene's own aggregate is published once all have been
    /// dispatched.
    pub async fn activate(
        self: &Arc<Self>,
        scene_id: &str,
        direction: Direction,
    ) -> EngineResult<()> {
        let Some(scene) = self.registry.get(scene_id).await else {
            return Err(EngineError::SceneNotFound(scene_id.to_string()));
        };
        if !scene.enabled {
            debug!(scene = %scene.id, "Scene is disabled, not activating");
            return Ok(());
        }

        debug!(scene = %scene.id, direction = %direction, "Activating scene");

        if scene.virtual_group {
            // No per-member values are asserted for a virtual group
            publish_status(
                &self.registry,
                &self.port,
                &scene.id,
                PointValue::Bool(direction.desired()),
            )
            .await;
            return Ok(());
        }

        let delays = stacked_delays(&scene.members);

        if scene.burst_interval == 0 {
            for (member, delay) in scene.members.iter().zip(&delays) {
                self.dispatch_member(&scene.id, member, *delay, direction)
                    .await;
            }
            self.finish_activation(&scene.id, direction).await;
        } else {
            let this = Arc::clone(self);
            let burst_interval = scene.burst_interval;
            let scene_point = scene.id.clone();
            let members = scene.members.clone();

            let handle = tokio::spawn(async move {
                for (i, (member, delay)) in members.iter().zip(&delays).enumerate() {
                    if i > 0 {
                        tokio::time::sleep(Duration::from_millis(burst_interval)).await;
                    }
                    this.dispatch_member(&scene_point, member, *delay, direction)
                        .await;
                }
                this.finish_activation(&scene_point, direction).await;
            });

            let mut bursts = self.bursts.lock().unwrap();
            bursts.retain(|h| !h.is_finished());
            bursts.push(handle);
        }

        Ok(())
    }

    /// Publish the scene's aggregate after all members have been dispatched
    ///
    /// Publishes TRUE, or the activation direction when the false branch is
    /// enabled. Re-validates the scene: a concurrent reload may have
    /// dropped it while members were being staggered.
    async fn finish_activation(&self, scene_id: &PointId, direction: Direction) {
        let Some(scene) = self.registry.get(scene_id.as_str()).await else {
            debug!(scene = %scene_id, "Scene dropped during activation, not publishing");
            return;
        };

        let value = if scene.on_false.enabled {
            PointValue::Bool(direction.desired())
        } else if direction == Direction::True {
            PointValue::Bool(true)
        } else {
            trace!(scene = %scene_id, "False activation with disabled false branch, nothing to publish");
            return;
        };

        publish_status(&self.registry, &self.port, &scene.id, value).await;
    }

    /// Execute one member's direction-side action
    async fn dispatch_member(
        &self,
        scene_id: &PointId,
        member: &Member,
        delay: u64,
        direction: Direction,
    ) {
        let Some(spec) = member.set_value(direction) else {
            debug!(
                scene = %scene_id,
                point = %member.point,
                direction = %direction,
                "No set value configured for direction, skipping member"
            );
            return;
        };

        let value = match self.resolver.resolve(spec).await {
            Ok(value) => value,
            Err(e) => {
                error!(
                    scene = %scene_id,
                    point = %member.point,
                    error = %e,
                    "Could not resolve set value, skipping member"
                );
                return;
            }
        };

        if value.is_null() {
            debug!(
                scene = %scene_id,
                point = %member.point,
                "Set value resolved to null, skipping member"
            );
            return;
        }

        if member.stop_all_delays {
            self.cancel_pending(&member.point);
        }

        if delay == 0 {
            apply_write(
                &self.port,
                &member.point,
                value,
                member.do_not_overwrite,
                member.ack_true,
            )
            .await;
        } else {
            self.schedule_write(member, delay, value);
        }
    }

    /// Schedule a delayed write to a member's point
    fn schedule_write(&self, member: &Member, delay: u64, value: PointValue) {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let point = member.point.clone();
        let do_not_overwrite = member.do_not_overwrite;
        let ack = member.ack_true;
        let port = self.port.clone();
        let pending = self.pending.clone();

        trace!(point = %point, delay_ms = delay, token, "Scheduling delayed write");

        let task_point = point.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;

            // Drop only our own entry; the list may have been cleared and
            // repopulated by a later activation in the meantime.
            if let Some(mut writes) = pending.get_mut(task_point.as_str()) {
                writes.retain(|w| w.token != token);
            }

            apply_write(&port, &task_point, value, do_not_overwrite, ack).await;
        });

        self.pending
            .entry(point.to_string())
            .or_default()
            .push(PendingWrite { token, handle });
    }

    /// Cancel every pending delayed write to a point
    fn cancel_pending(&self, point_id: &PointId) {
        if let Some((_, writes)) = self.pending.remove(point_id.as_str()) {
            debug!(
                point = %point_id,
                count = writes.len(),
                "Cancelling pending delayed writes"
            );
            for write in writes {
                write.handle.abort();
            }
        }
    }

    /// Cancel all pending delayed writes and in-flight burst dispatches
    ///
    /// Called on engine reset/reload.
    pub fn cancel_all(&self) {
        let points: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for point in points {
            if let Some((_, writes)) = self.pending.remove(&point) {
                for write in writes {
                    write.handle.abort();
                }
            }
        }

        let mut bursts = self.bursts.lock().unwrap();
        for handle in bursts.drain(..) {
            handle.abort();
        }
    }

    /// Number of points with pending delayed writes (test hook)
    pub fn pending_point_count(&self) -> usize {
        self.pending.len()
    }
}

/// Apply a write, honoring `doNotOverwrite`
///
/// `doNotOverwrite` reads the point's live value immediately before
/// writing and writes only if it differs from the desired value. Write
/// rejections are logged, never retried: activation is fire-and-forget.
async fn apply_write(
    port: &Arc<dyn PointPort>,
    point_id: &PointId,
    value: PointValue,
    do_not_overwrite: bool,
    acknowledged: bool,
) {
    if do_not_overwrite {
        match port.read_point(point_id).await {
            Ok(Some(sample)) if sample.value.loose_eq(&value) => {
                debug!(point = %point_id, value = %value, "Point already at desired value, not overwriting");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(point = %point_id, error = %e, "Read before write failed");
            }
        }
    }

    trace!(point = %point_id, value = %value, acknowledged, "Writing point");
    if let Err(e) = port.write_point(point_id, value, acknowledged).await {
        error!(point = %point_id, error = %e, "Point write rejected");
    }
}

/// Compute each member's total write delay
///
/// Scanning the members before the current one, each of their delays joins
/// a running carry once some member has `stackNextDelays` set. The carry
/// switches on with the opting member (its own delay included) and stays
/// on. The carry plus the member's own delay is its write delay.
pub(crate) fn stacked_delays(members: &[Member]) -> Vec<u64> {
    members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let mut carry = 0;
            let mut stacking = false;
            for earlier in &members[..i] {
                if earlier.stack_next_delays {
                    stacking = true;
                }
                if stacking {
                    carry += earlier.delay;
                }
            }
            carry + member.delay
        })
        .collect()
}
