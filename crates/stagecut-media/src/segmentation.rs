//! Frame pipeline: detector, tracker and occupancy machine wired together.
//!
//! One [`Segmenter`] per video. It owns the background model, the tracker
//! and the occupancy machine, and consumes frames strictly in order.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::activity::{detect, BackgroundModel, DetectorConfig};
use crate::error::{MediaError, MediaResult};
use crate::frame_source::{Frame, FrameStream};
use crate::occupancy::{post_process, OccupancyConfig, OccupancyMachine, OccupancyPhase, OccupancyReport};
use crate::tracker::{ObjectTracker, TrackerConfig};

/// Detector, tracker and occupancy settings for one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub detection: DetectorConfig,
    pub tracking: TrackerConfig,
    pub occupancy: OccupancyConfig,
}

impl SegmentationConfig {
    pub fn validate(&self) -> MediaResult<()> {
        self.detection.validate()?;
        self.tracking.validate()?;
        self.occupancy.validate()
    }
}

/// Per-frame summary returned by [`Segmenter::process_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameActivity {
    pub blobs: usize,
    pub live_tracks: usize,
    pub phase: OccupancyPhase,
}

/// Stateful frame-to-interval pipeline for a single video.
pub struct Segmenter {
    model: BackgroundModel,
    tracker: ObjectTracker,
    machine: OccupancyMachine,
    occupancy: OccupancyConfig,
    last_timestamp: f64,
}

impl Segmenter {
    /// Create a segmenter for analysis frames of `width` x `height`.
    pub fn new(config: &SegmentationConfig, width: u32, height: u32) -> MediaResult<Self> {
        config.validate()?;
        Ok(Self {
            model: BackgroundModel::new(config.detection.clone()),
            tracker: ObjectTracker::new(config.tracking.clone()),
            machine: OccupancyMachine::new(&config.occupancy, width, height),
            occupancy: config.occupancy.clone(),
            last_timestamp: 0.0,
        })
    }

    pub fn process_frame(&mut self, frame: &Frame) -> MediaResult<FrameActivity> {
        let blobs = detect(&mut self.model, frame)?;
        let snapshots = self.tracker.update(&blobs, frame.timestamp);
        self.machine.observe(frame.timestamp, &snapshots);
        self.last_timestamp = frame.timestamp;

        Ok(FrameActivity {
            blobs: blobs.len(),
            live_tracks: self.tracker.live_count(),
            phase: self.machine.phase(),
        })
    }

    /// Timestamp of the last processed frame.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// Close any open interval at `end_time` and post-process.
    pub fn finish(self, end_time: f64) -> OccupancyReport {
        let raw = self.machine.finish(end_time);
        debug!(raw = raw.len(), end_time, "Frame pipeline finished");
        post_process(raw, &self.occupancy)
    }
}

/// Result of running a whole stream through a [`Segmenter`].
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    pub report: OccupancyReport,
    pub frames: u64,
    /// Timestamp of the last frame
    pub end_time: f64,
}

/// Frames buffered between the decoder and the analysis thread.
const FRAME_QUEUE: usize = 32;

/// Drain `stream` through a fresh [`Segmenter`].
///
/// Frames are read on the calling task and analysed on the blocking pool,
/// so the per-pixel work never holds an async worker thread.
pub async fn segment_stream<S>(
    stream: &mut S,
    config: &SegmentationConfig,
) -> MediaResult<SegmentationOutput>
where
    S: FrameStream + ?Sized,
{
    let (width, height) = stream.dimensions();
    let segmenter = Segmenter::new(config, width, height)?;
    let (tx, rx) = mpsc::channel::<Frame>(FRAME_QUEUE);
    let analysis = tokio::task::spawn_blocking(move || analyse_frames(segmenter, rx));

    let mut read_error = None;
    loop {
        match stream.next_frame().await {
            Ok(Some(frame)) => {
                // A closed channel means analysis already failed
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                read_error = Some(e);
                break;
            }
        }
    }
    drop(tx);

    let analysed = analysis
        .await
        .map_err(|e| MediaError::internal(format!("segmentation task failed: {}", e)))?;
    let (segmenter, frames) = analysed?;
    if let Some(e) = read_error {
        return Err(e);
    }

    let end_time = segmenter.last_timestamp();
    let report = segmenter.finish(end_time);
    info!(
        frames,
        end_time,
        intervals = report.intervals.len(),
        discarded = report.discarded.len(),
        merges = report.merges,
        "Segmentation complete"
    );

    Ok(SegmentationOutput {
        report,
        frames,
        end_time,
    })
}

fn analyse_frames(
    mut segmenter: Segmenter,
    mut rx: mpsc::Receiver<Frame>,
) -> MediaResult<(Segmenter, u64)> {
    let mut frames = 0u64;
    while let Some(frame) = rx.blocking_recv() {
        let activity = segmenter.process_frame(&frame)?;
        frames += 1;
        if frame.index > 0 && frame.index % 1000 == 0 {
            debug!(
                frame = frame.index,
                timestamp = frame.timestamp,
                blobs = activity.blobs,
                tracks = activity.live_tracks,
                phase = ?activity.phase,
                "Segmentation progress"
            );
        }
    }
    Ok((segmenter, frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::MemoryFrameStream;
    use image::GrayImage;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_footage_has_no_intervals() {
        let frames = (0..200)
            .map(|i| Frame {
                index: i,
                timestamp: i as f64 / 5.0,
                image: GrayImage::from_pixel(64, 36, image::Luma([60])),
            })
            .collect();
        let mut stream = MemoryFrameStream::new(64, 36, frames);

        let output = segment_stream(&mut stream, &SegmentationConfig::default())
            .await
            .unwrap();
        assert_eq!(output.frames, 200);
        assert!(output.report.intervals.is_empty());
        assert!(output.report.discarded.is_empty());
    }

    fn flat_frames(count: u64) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame {
                index: i,
                timestamp: i as f64 / 5.0,
                image: GrayImage::from_pixel(64, 36, image::Luma([60])),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_runtime_keeps_running_during_analysis() {
        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        };

        // Single-threaded runtime: the ticker only runs if segmentation yields
        let mut stream = MemoryFrameStream::new(64, 36, flat_frames(2000));
        let output = segment_stream(&mut stream, &SegmentationConfig::default())
            .await
            .unwrap();
        let during = ticks.load(Ordering::Relaxed);
        ticker.abort();

        assert_eq!(output.frames, 2000);
        assert!(during > 0);
    }

    #[tokio::test]
    async fn test_analysis_error_stops_reading() {
        let mut frames = flat_frames(100);
        frames[50].image = GrayImage::new(32, 36);
        let mut stream = MemoryFrameStream::new(64, 36, frames);

        let err = segment_stream(&mut stream, &SegmentationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FrameSizeMismatch { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SegmentationConfig::default();
        config.occupancy.merge_tolerance_secs = 1.0;
        assert!(Segmenter::new(&config, 64, 36).is_err());
    }
}
