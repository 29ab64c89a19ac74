//! Per-frame blobs and tracked-object snapshots.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{BoundingBox, Point};

/// A single frame's detected region of motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blob {
    /// Mean position of the blob's foreground pixels
    pub centroid: Point,
    /// Tight box around the blob's pixels
    pub bbox: BoundingBox,
    /// Number of foreground pixels
    pub area: u32,
}

/// Stable identifier of a tracked object. Ids increase monotonically and are
/// never reused within one tracker instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Lifecycle state of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Newly created, not yet confirmed by enough consecutive matches
    #[default]
    Tentative,
    /// Confirmed and matched in the most recent frame
    Active,
    /// Confirmed but currently unmatched, within the grace limit
    Disappearing,
    /// Exceeded the grace limit (or flickered out while tentative)
    Terminated,
}

impl TrackState {
    /// Whether the object has been confirmed at some point.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TrackState::Active | TrackState::Disappearing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackState::Tentative => "tentative",
            TrackState::Active => "active",
            TrackState::Disappearing => "disappearing",
            TrackState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a tracked object after one tracker update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub state: TrackState,
    /// Last observed centroid
    pub centroid: Point,
    /// Last observed bounding box
    pub bbox: BoundingBox,
    /// Timestamp of the first matched blob (seconds)
    pub first_seen: f64,
    /// Timestamp of the most recent matched blob (seconds)
    pub last_seen: f64,
    /// Consecutive frames without a matching blob
    pub missed_frames: u32,
}

impl TrackSnapshot {
    /// Whether the object was matched to a blob in the frame that produced
    /// this snapshot.
    pub fn observed(&self) -> bool {
        self.missed_frames == 0 && self.state != TrackState::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_state_serialization() {
        let json = serde_json::to_string(&TrackState::Disappearing).unwrap();
        assert_eq!(json, "\"disappearing\"");
        assert!(TrackState::Disappearing.is_confirmed());
        assert!(!TrackState::Tentative.is_confirmed());
    }

    #[test]
    fn test_track_id_display_and_order() {
        assert_eq!(TrackId(7).to_string(), "T7");
        assert!(TrackId(2) < TrackId(10));
    }
}
