//! Sample type representing a point's current value

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, PointId, PointValue};

/// A point's value at a moment in time
///
/// Carries the value, its acknowledgement flag (whether the value has been
/// confirmed by the device behind the point or is a pending command), and
/// timestamps for when it last changed and was last updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSample {
    /// The point this sample belongs to
    pub point_id: PointId,

    /// The sampled value
    pub value: PointValue,

    /// Whether the value is acknowledged (confirmed) as opposed to commanded
    pub acknowledged: bool,

    /// When the value last changed (different from previous sample)
    pub last_changed: DateTime<Utc>,

    /// When the sample was last written (even if the value didn't change)
    pub last_updated: DateTime<Utc>,

    /// Context of the change that produced this sample
    pub context: Context,
}

impl PointSample {
    /// Create a new sample with current timestamps
    pub fn new(
        point_id: PointId,
        value: PointValue,
        acknowledged: bool,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            point_id,
            value,
            acknowledged,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create an updated sample, preserving last_changed if the value is
    /// the same
    pub fn with_update(&self, value: PointValue, acknowledged: bool, context: Context) -> Self {
        let now = Utc::now();
        let changed = self.value != value;

        Self {
            point_id: self.point_id.clone(),
            value,
            acknowledged,
            last_changed: if changed { now } else { self.last_changed },
            last_updated: now,
            context,
        }
    }
}

impl PartialEq for PointSample {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not compared
        self.point_id == other.point_id
            && self.value == other.value
            && self.acknowledged == other.acknowledged
    }
}
