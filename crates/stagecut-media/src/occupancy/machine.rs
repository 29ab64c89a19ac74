//! State machine turning tracked objects into raw performance intervals.
//!
//! # State Machine
//!
//! ```text
//!              candidate inside            active object inside
//!   ┌──────┐ ─────────────────▶ ┌─────────┐ ─────────────────▶ ┌──────────┐
//!   │ Idle │                    │Entering │                    │ Occupied │
//!   └──────┘ ◀───────────────── └─────────┘                    └──────────┘
//!      ▲        nobody inside                                    │    ▲
//!      │                                        no active inside │    │ back within
//!      │        absent > gap_tolerance         ┌─────────┐       │    │ gap_tolerance
//!      └────────── close interval ──────────── │ Exiting │ ◀─────┘    │
//!                                              └─────────┘ ───────────┘
//! ```

use stagecut_models::{
    BoundingBox, IntervalQuality, PerformanceInterval, TrackId, TrackSnapshot, TrackState,
};
use tracing::debug;

use super::config::OccupancyConfig;

/// Internal state of the occupancy machine.
#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    /// A candidate is inside but not yet confirmed.
    Entering { start: f64, track: TrackId },
    /// A confirmed object is on stage.
    Occupied {
        start: f64,
        track: TrackId,
        last_present: f64,
        gaps: u32,
    },
    /// Nobody confirmed is visible; waiting out the gap tolerance.
    Exiting {
        start: f64,
        track: TrackId,
        last_present: f64,
        gaps: u32,
    },
}

/// Public view of the machine's state, for observers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyPhase {
    Idle,
    Entering,
    Occupied,
    Exiting,
}

/// Converts per-frame track snapshots into raw (unfiltered) intervals.
#[derive(Debug)]
pub struct OccupancyMachine {
    gap_tolerance: f64,
    stage: BoundingBox,
    state: State,
    intervals: Vec<PerformanceInterval>,
    last_timestamp: Option<f64>,
}

impl OccupancyMachine {
    /// Create a machine for analysis frames of the given size.
    pub fn new(config: &OccupancyConfig, frame_width: u32, frame_height: u32) -> Self {
        Self {
            gap_tolerance: config.gap_tolerance_secs,
            stage: config.stage.to_pixels(frame_width, frame_height),
            state: State::Idle,
            intervals: Vec::new(),
            last_timestamp: None,
        }
    }

    pub fn phase(&self) -> OccupancyPhase {
        match self.state {
            State::Idle => OccupancyPhase::Idle,
            State::Entering { .. } => OccupancyPhase::Entering,
            State::Occupied { .. } => OccupancyPhase::Occupied,
            State::Exiting { .. } => OccupancyPhase::Exiting,
        }
    }

    /// Raw intervals closed so far.
    pub fn closed(&self) -> &[PerformanceInterval] {
        &self.intervals
    }

    /// Feed the snapshots produced for the frame at `timestamp`.
    ///
    /// Timestamps must be non-decreasing; an out-of-order frame is ignored.
    pub fn observe(&mut self, timestamp: f64, snapshots: &[TrackSnapshot]) {
        if self.last_timestamp.is_some_and(|last| timestamp < last) {
            debug!(timestamp, "Ignoring out-of-order frame");
            return;
        }
        self.last_timestamp = Some(timestamp);

        let inside = |s: &&TrackSnapshot| s.observed() && self.stage.contains(&s.centroid);
        // Confirmed and seen this frame
        let present = snapshots
            .iter()
            .filter(inside)
            .find(|s| s.state == TrackState::Active)
            .map(|s| s.id);
        // Anything plausibly a performer walking on
        let candidate = snapshots
            .iter()
            .filter(inside)
            .find(|s| s.state == TrackState::Tentative || s.state == TrackState::Active)
            .map(|s| s.id);

        self.state = match (self.state, present) {
            (State::Idle | State::Entering { .. }, Some(track)) => {
                let start = match self.state {
                    State::Entering { start, .. } => start,
                    _ => timestamp,
                };
                debug!(%track, start, "Stage occupied");
                State::Occupied {
                    start,
                    track,
                    last_present: timestamp,
                    gaps: 0,
                }
            }
            (State::Idle, None) => match candidate {
                Some(track) => State::Entering {
                    start: timestamp,
                    track,
                },
                None => State::Idle,
            },
            (State::Entering { start, track }, None) => match candidate {
                // Keep the earliest observed entry time while any candidate remains
                Some(_) => State::Entering { start, track },
                None => State::Idle,
            },
            (
                State::Occupied {
                    start, track, gaps, ..
                },
                Some(_),
            ) => State::Occupied {
                start,
                track,
                last_present: timestamp,
                gaps,
            },
            (
                State::Occupied {
                    start,
                    track,
                    last_present,
                    gaps,
                }
                | State::Exiting {
                    start,
                    track,
                    last_present,
                    gaps,
                },
                None,
            ) => {
                if timestamp - last_present > self.gap_tolerance {
                    self.close(start, last_present, track, gaps, IntervalQuality::Confirmed);
                    match candidate {
                        Some(track) => State::Entering {
                            start: timestamp,
                            track,
                        },
                        None => State::Idle,
                    }
                } else {
                    State::Exiting {
                        start,
                        track,
                        last_present,
                        gaps,
                    }
                }
            }
            (
                State::Exiting {
                    start,
                    track,
                    last_present,
                    gaps,
                },
                Some(present_track),
            ) => {
                if timestamp - last_present <= self.gap_tolerance {
                    debug!(%track, gap = timestamp - last_present, "Absence bridged");
                    State::Occupied {
                        start,
                        track,
                        last_present: timestamp,
                        gaps: gaps + 1,
                    }
                } else {
                    // Frames arrived too sparsely to notice the exit in time
                    self.close(start, last_present, track, gaps, IntervalQuality::Confirmed);
                    State::Occupied {
                        start: timestamp,
                        track: present_track,
                        last_present: timestamp,
                        gaps: 0,
                    }
                }
            }
        };
    }

    /// Close any open interval at end of video and return every raw interval.
    ///
    /// An interval still `Occupied` when the video ends is flagged
    /// [`IntervalQuality::Truncated`].
    pub fn finish(mut self, end_time: f64) -> Vec<PerformanceInterval> {
        match self.state {
            State::Occupied {
                start,
                track,
                last_present,
                gaps,
            } => {
                let end = last_present.min(end_time);
                self.close(start, end, track, gaps, IntervalQuality::Truncated);
            }
            State::Exiting {
                start,
                track,
                last_present,
                gaps,
            } => {
                let end = last_present.min(end_time);
                self.close(start, end, track, gaps, IntervalQuality::Confirmed);
            }
            State::Idle | State::Entering { .. } => {}
        }
        self.state = State::Idle;
        self.intervals
    }

    fn close(&mut self, start: f64, end: f64, track: TrackId, gaps: u32, quality: IntervalQuality) {
        if end <= start {
            debug!(%track, start, end, "Dropping zero-length occupancy");
            return;
        }
        let mut interval = PerformanceInterval::new(start, end, track);
        interval.quality = quality;
        interval.gaps_bridged = gaps;
        debug!(%track, start, end, ?quality, "Occupancy interval closed");
        self.intervals.push(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecut_models::{Point, StageRegion};

    const W: u32 = 100;
    const H: u32 = 50;

    fn machine(gap: f64) -> OccupancyMachine {
        let config = OccupancyConfig {
            stage: StageRegion::horizontal_band(0.2, 0.8),
            gap_tolerance_secs: gap,
            merge_tolerance_secs: gap,
            min_duration_secs: 1.0,
        };
        OccupancyMachine::new(&config, W, H)
    }

    fn snap(id: u64, state: TrackState, x: f64, missed: u32) -> TrackSnapshot {
        TrackSnapshot {
            id: TrackId(id),
            state,
            centroid: Point::new(x, 25.0),
            bbox: BoundingBox::new(x - 2.0, 20.0, 4.0, 10.0),
            first_seen: 0.0,
            last_seen: 0.0,
            missed_frames: missed,
        }
    }

    #[test]
    fn test_entry_start_is_first_observation_inside() {
        let mut m = machine(1.0);
        m.observe(0.0, &[snap(1, TrackState::Tentative, 50.0, 0)]);
        assert_eq!(m.phase(), OccupancyPhase::Entering);
        m.observe(0.5, &[snap(1, TrackState::Tentative, 50.0, 0)]);
        m.observe(1.0, &[snap(1, TrackState::Active, 50.0, 0)]);
        assert_eq!(m.phase(), OccupancyPhase::Occupied);
        m.observe(10.0, &[snap(1, TrackState::Active, 50.0, 0)]);
        m.observe(10.5, &[]);
        m.observe(12.0, &[]);

        let intervals = m.finish(20.0);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, 0.0);
        assert_eq!(intervals[0].end, 10.0);
        assert_eq!(intervals[0].quality, IntervalQuality::Confirmed);
    }

    #[test]
    fn test_short_gap_is_bridged() {
        let mut m = machine(3.0);
        m.observe(0.0, &[snap(1, TrackState::Active, 50.0, 0)]);
        m.observe(5.0, &[snap(1, TrackState::Active, 50.0, 0)]);
        m.observe(6.0, &[snap(1, TrackState::Disappearing, 50.0, 1)]);
        assert_eq!(m.phase(), OccupancyPhase::Exiting);
        m.observe(7.5, &[snap(1, TrackState::Active, 50.0, 0)]);
        assert_eq!(m.phase(), OccupancyPhase::Occupied);
        m.observe(12.0, &[snap(1, TrackState::Active, 50.0, 0)]);

        let intervals = m.finish(12.0);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].gaps_bridged, 1);
        assert_eq!(intervals[0].quality, IntervalQuality::Truncated);
        assert_eq!((intervals[0].start, intervals[0].end), (0.0, 12.0));
    }

    #[test]
    fn test_long_gap_splits() {
        let mut m = machine(3.0);
        for t in [0.0, 2.0, 4.0] {
            m.observe(t, &[snap(1, TrackState::Active, 50.0, 0)]);
        }
        for t in [5.0, 6.0, 7.0, 8.0] {
            m.observe(t, &[]);
        }
        for t in [9.0, 11.0] {
            m.observe(t, &[snap(2, TrackState::Active, 50.0, 0)]);
        }
        m.observe(20.0, &[]);

        let intervals = m.finish(30.0);
        assert_eq!(intervals.len(), 2);
        assert_eq!((intervals[0].start, intervals[0].end), (0.0, 4.0));
        assert_eq!((intervals[1].start, intervals[1].end), (9.0, 11.0));
        assert_eq!(intervals[1].track_id, TrackId(2));
    }

    #[test]
    fn test_objects_outside_stage_ignored() {
        let mut m = machine(1.0);
        for i in 0..20 {
            // x = 10 is in the left wing (stage starts at x = 20)
            m.observe(i as f64, &[snap(1, TrackState::Active, 10.0, 0)]);
        }
        assert_eq!(m.phase(), OccupancyPhase::Idle);
        assert!(m.finish(20.0).is_empty());
    }

    #[test]
    fn test_unconfirmed_entry_returns_to_idle() {
        let mut m = machine(1.0);
        m.observe(0.0, &[snap(1, TrackState::Tentative, 50.0, 0)]);
        m.observe(0.2, &[snap(1, TrackState::Terminated, 50.0, 1)]);
        assert_eq!(m.phase(), OccupancyPhase::Idle);
    }
}
