//! Centroid tracker for maintaining object identity across frames.
//!
//! Blobs are associated with existing objects by greedy nearest-neighbour
//! matching against each object's predicted position. Objects move through
//! `tentative -> active <-> disappearing -> terminated`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use stagecut_models::{Blob, BoundingBox, Point, TrackId, TrackSnapshot, TrackState};

use crate::error::{MediaError, MediaResult};

/// Tracker parameters. Distances are in analysis-frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Largest distance between a predicted centroid and a blob for a match
    pub max_match_distance: f64,
    /// Unmatched frames tolerated before an object is terminated
    pub max_missed_frames: u32,
    /// Consecutive matched frames needed to promote a tentative object
    pub confirm_frames: u32,
    /// Centroid history kept per object, used for velocity
    pub history_window_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 40.0,
            max_missed_frames: 10,
            confirm_frames: 3,
            history_window_secs: 2.0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.max_match_distance.is_finite() && self.max_match_distance > 0.0) {
            return Err(MediaError::invalid_config(
                "tracking.max_match_distance must be > 0",
            ));
        }
        if self.confirm_frames == 0 {
            return Err(MediaError::invalid_config(
                "tracking.confirm_frames must be >= 1",
            ));
        }
        if !(self.history_window_secs.is_finite() && self.history_window_secs >= 0.0) {
            return Err(MediaError::invalid_config(
                "tracking.history_window_secs must be >= 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TrackedObject {
    state: TrackState,
    /// (timestamp, centroid), oldest first
    history: VecDeque<(f64, Point)>,
    bbox: BoundingBox,
    first_seen: f64,
    last_seen: f64,
    missed_frames: u32,
    consecutive_hits: u32,
}

impl TrackedObject {
    fn centroid(&self) -> Point {
        self.history.back().map(|(_, p)| *p).unwrap_or_default()
    }

    /// Last centroid extrapolated to `timestamp` with the history's mean velocity.
    fn predict(&self, timestamp: f64) -> Point {
        let last = self.centroid();
        let (Some(&(t0, p0)), Some(&(t1, p1))) = (self.history.front(), self.history.back()) else {
            return last;
        };
        let span = t1 - t0;
        if span <= 0.0 {
            return last;
        }
        let dt = timestamp - t1;
        Point::new(
            p1.x + (p1.x - p0.x) / span * dt,
            p1.y + (p1.y - p0.y) / span * dt,
        )
    }

    fn snapshot(&self, id: TrackId) -> TrackSnapshot {
        TrackSnapshot {
            id,
            state: self.state,
            centroid: self.centroid(),
            bbox: self.bbox,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            missed_frames: self.missed_frames,
        }
    }
}

/// Multi-object tracker. One instance per video.
#[derive(Debug)]
pub struct ObjectTracker {
    config: TrackerConfig,
    objects: BTreeMap<TrackId, TrackedObject>,
    next_id: u64,
}

impl ObjectTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            objects: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Number of live (non-terminated) objects.
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    /// Drop every object. Ids keep increasing after a reset.
    pub fn reset(&mut self) {
        self.objects.clear();
    }

    /// Associate this frame's blobs with tracked objects.
    ///
    /// Returns snapshots of every live object plus objects terminated by this
    /// update, ordered by id.
    pub fn update(&mut self, blobs: &[Blob], timestamp: f64) -> Vec<TrackSnapshot> {
        // Every (object, blob) pair within range, closest first
        let mut candidates: Vec<(f64, TrackId, usize)> = Vec::new();
        for (&id, object) in &self.objects {
            let predicted = object.predict(timestamp);
            for (j, blob) in blobs.iter().enumerate() {
                let d = predicted.distance(&blob.centroid);
                if d <= self.config.max_match_distance {
                    candidates.push((d, id, j));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut matched_objects: BTreeMap<TrackId, usize> = BTreeMap::new();
        let mut blob_taken = vec![false; blobs.len()];
        for (_, id, j) in candidates {
            if blob_taken[j] || matched_objects.contains_key(&id) {
                continue;
            }
            blob_taken[j] = true;
            matched_objects.insert(id, j);
        }

        let window = self.config.history_window_secs;
        for (id, object) in self.objects.iter_mut() {
            match matched_objects.get(id) {
                Some(&j) => {
                    let blob = &blobs[j];
                    object.history.push_back((timestamp, blob.centroid));
                    while object.history.len() > 1
                        && object.history.front().is_some_and(|(t, _)| timestamp - t > window)
                    {
                        object.history.pop_front();
                    }
                    object.bbox = blob.bbox;
                    object.last_seen = timestamp;
                    object.missed_frames = 0;
                    object.consecutive_hits += 1;

                    object.state = match object.state {
                        TrackState::Tentative
                            if object.consecutive_hits >= self.config.confirm_frames =>
                        {
                            TrackState::Active
                        }
                        TrackState::Disappearing => TrackState::Active,
                        state => state,
                    };
                }
                None => {
                    object.missed_frames += 1;
                    object.consecutive_hits = 0;
                    object.state = match object.state {
                        // A blob that flickers out before confirmation is noise
                        TrackState::Tentative => TrackState::Terminated,
                        _ if object.missed_frames > self.config.max_missed_frames => {
                            TrackState::Terminated
                        }
                        TrackState::Active => TrackState::Disappearing,
                        state => state,
                    };
                }
            }
        }

        for (j, blob) in blobs.iter().enumerate() {
            if blob_taken[j] {
                continue;
            }
            let id = TrackId(self.next_id);
            self.next_id += 1;
            let state = if self.config.confirm_frames <= 1 {
                TrackState::Active
            } else {
                TrackState::Tentative
            };
            self.objects.insert(
                id,
                TrackedObject {
                    state,
                    history: VecDeque::from([(timestamp, blob.centroid)]),
                    bbox: blob.bbox,
                    first_seen: timestamp,
                    last_seen: timestamp,
                    missed_frames: 0,
                    consecutive_hits: 1,
                },
            );
        }

        let snapshots: Vec<TrackSnapshot> = self
            .objects
            .iter()
            .map(|(&id, object)| object.snapshot(id))
            .collect();

        self.objects
            .retain(|_, object| object.state != TrackState::Terminated);

        snapshots
    }
}
