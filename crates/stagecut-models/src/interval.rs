//! Performance intervals produced by the occupancy state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::track::TrackId;

/// How an interval came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntervalQuality {
    /// Single entry/exit cycle observed cleanly
    #[default]
    Confirmed,
    /// Assembled from several fragments closer than the merge tolerance
    Merged,
    /// The video ended while the stage was still occupied
    Truncated,
}

/// A confirmed time range during which a performer is judged present on stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceInterval {
    /// Start time in seconds from the start of the source video
    pub start: f64,
    /// End time in seconds from the start of the source video
    pub end: f64,
    /// Track whose entry opened the interval
    pub track_id: TrackId,
    pub quality: IntervalQuality,
    /// Number of raw intervals merged into this one (1 when never merged)
    #[serde(default = "default_fragments")]
    pub fragments: u32,
    /// Short absences bridged by the exit debounce
    #[serde(default)]
    pub gaps_bridged: u32,
}

fn default_fragments() -> u32 {
    1
}

impl PerformanceInterval {
    pub fn new(start: f64, end: f64, track_id: TrackId) -> Self {
        Self {
            start,
            end,
            track_id,
            quality: IntervalQuality::Confirmed,
            fragments: 1,
            gaps_bridged: 0,
        }
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether two intervals share any time.
    pub fn overlaps(&self, other: &PerformanceInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check the ordering invariants of a list of intervals: each has
    /// `start < end`, and they are sorted by start without overlap.
    pub fn is_ordered_and_disjoint(intervals: &[PerformanceInterval]) -> bool {
        intervals.iter().all(|i| i.start < i.end)
            && intervals.windows(2).all(|w| w[0].end <= w[1].start)
    }
}
