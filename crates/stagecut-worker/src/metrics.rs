//! Prometheus metrics for the pipeline.
//!
//! Recording is a no-op unless a recorder is installed with
//! [`init_metrics`].

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use stagecut_models::AudioSource;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::internal(format!("failed to install metrics recorder: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Frame pipeline
    pub const FRAMES_PROCESSED_TOTAL: &str = "stagecut_frames_processed_total";
    pub const INTERVALS_DETECTED_TOTAL: &str = "stagecut_intervals_detected_total";
    pub const INTERVALS_DISCARDED_TOTAL: &str = "stagecut_intervals_discarded_total";

    // Sync
    pub const SYNC_CONFIDENCE: &str = "stagecut_sync_confidence";

    // Clips
    pub const CLIPS_COMPLETED_TOTAL: &str = "stagecut_clips_completed_total";
    pub const CLIPS_FAILED_TOTAL: &str = "stagecut_clips_failed_total";
    pub const ENCODE_ATTEMPTS_TOTAL: &str = "stagecut_encode_attempts_total";
    pub const ENCODE_DURATION_SECONDS: &str = "stagecut_encode_duration_seconds";

    // Videos
    pub const VIDEOS_PROCESSED_TOTAL: &str = "stagecut_videos_processed_total";
}

/// Record frames decoded and analyzed for one video.
pub fn record_frames_processed(frames: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(frames);
}

/// Record accepted intervals for one video.
pub fn record_intervals_detected(count: usize) {
    counter!(names::INTERVALS_DETECTED_TOTAL).increment(count as u64);
}

/// Record intervals dropped during post-processing.
pub fn record_intervals_discarded(count: usize) {
    counter!(names::INTERVALS_DISCARDED_TOTAL).increment(count as u64);
}

/// Record the correlation strength of an offset estimate.
pub fn record_sync_confidence(method: &str, confidence: f64) {
    let labels = [("method", method.to_string())];
    histogram!(names::SYNC_CONFIDENCE, &labels).record(confidence);
}

/// Record a completed clip.
pub fn record_clip_completed(audio_source: AudioSource) {
    let labels = [("audio", audio_source_label(audio_source).to_string())];
    counter!(names::CLIPS_COMPLETED_TOTAL, &labels).increment(1);
}

/// Record a permanently failed clip.
pub fn record_clip_failed() {
    counter!(names::CLIPS_FAILED_TOTAL).increment(1);
}

/// Record one encode attempt and its outcome (`ok`, `transient`, `permanent`).
pub fn record_encode_attempt(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ENCODE_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record wall time of a successful encode.
pub fn record_encode_duration(duration_secs: f64) {
    histogram!(names::ENCODE_DURATION_SECONDS).record(duration_secs);
}

/// Record a finished video by terminal status.
pub fn record_video_processed(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::VIDEOS_PROCESSED_TOTAL, &labels).increment(1);
}

fn audio_source_label(source: AudioSource) -> &'static str {
    match source {
        AudioSource::Mixed => "mixed",
        AudioSource::Replaced => "replaced",
        AudioSource::Camera => "camera",
    }
}
