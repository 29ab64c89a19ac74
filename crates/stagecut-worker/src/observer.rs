//! Progress notifications from the pipeline.

use std::path::Path;
use tracing::info;

use stagecut_models::{AudioOffset, ClipRecord, PerformanceInterval, VideoId};

use crate::pipeline::VideoReport;

/// Receives pipeline events. Every method defaults to doing nothing.
///
/// Called from pipeline tasks, possibly concurrently for different videos
/// and clips; implementations must not block.
pub trait PipelineObserver: Send + Sync {
    fn on_video_started(&self, _video_id: &VideoId, _source: &Path) {}

    /// An accepted interval, 1-based `index`.
    fn on_interval(&self, _video_id: &VideoId, _index: usize, _interval: &PerformanceInterval) {}

    fn on_offset(&self, _video_id: &VideoId, _offset: &AudioOffset) {}

    /// A clip reached a terminal state.
    fn on_clip_finished(&self, _record: &ClipRecord) {}

    fn on_video_finished(&self, _report: &VideoReport) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Logs every event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn on_video_started(&self, video_id: &VideoId, source: &Path) {
        info!(video_id = %video_id, source = %source.display(), "Video started");
    }

    fn on_interval(&self, video_id: &VideoId, index: usize, interval: &PerformanceInterval) {
        info!(
            video_id = %video_id,
            interval_index = index,
            start = interval.start,
            end = interval.end,
            quality = ?interval.quality,
            "Performance found"
        );
    }

    fn on_offset(&self, video_id: &VideoId, offset: &AudioOffset) {
        info!(
            video_id = %video_id,
            offset_secs = offset.offset_secs,
            confidence = offset.confidence,
            low_confidence = offset.low_confidence,
            "Audio offset"
        );
    }

    fn on_clip_finished(&self, record: &ClipRecord) {
        info!(
            video_id = %record.video_id,
            interval_index = record.index,
            status = ?record.status,
            attempts = record.attempts,
            output = %record.output_path.display(),
            "Clip finished"
        );
    }

    fn on_video_finished(&self, report: &VideoReport) {
        info!(
            video_id = %report.video_id,
            status = report.status.as_str(),
            intervals = report.intervals.len(),
            clips = report.clips.len(),
            "Video finished"
        );
    }
}
