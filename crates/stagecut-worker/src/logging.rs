//! Structured per-video logging utilities.
//!
//! Provides consistent lifecycle records for one video's pipeline run with
//! the video id and pipeline stage attached to every event.

use tracing::{error, info, warn, Span};
use stagecut_models::VideoId;

/// Video logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct VideoLogger {
    video_id: String,
    stage: String,
}

impl VideoLogger {
    /// Create a new logger for a video and pipeline stage
    /// (e.g. "segmentation", "clip_extraction").
    pub fn new(video_id: &VideoId, stage: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// Same logger, different stage.
    pub fn for_stage(&self, stage: &str) -> Self {
        Self {
            video_id: self.video_id.clone(),
            stage: stage.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            video_id = %self.video_id,
            stage = %self.stage,
            "Completed: {}", message
        );
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Span carrying the video id, for instrumenting a whole stage.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "video",
            video_id = %self.video_id,
            stage = %self.stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_logger_creation() {
        let video_id = VideoId::from("recital_2024");
        let logger = VideoLogger::new(&video_id, "segmentation");

        assert_eq!(logger.video_id(), "recital_2024");
        assert_eq!(logger.stage(), "segmentation");
    }

    #[test]
    fn test_for_stage_keeps_video() {
        let logger = VideoLogger::new(&VideoId::from("v"), "segmentation").for_stage("sync");
        assert_eq!(logger.video_id(), "v");
        assert_eq!(logger.stage(), "sync");
    }
}
