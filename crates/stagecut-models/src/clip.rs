//! Clip windows and per-clip records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::interval::PerformanceInterval;
use crate::video::VideoId;

/// Padded cut boundaries of one clip, in source-video seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipWindow {
    pub start: f64,
    pub end: f64,
}

impl ClipWindow {
    /// Pad an interval and clamp it to `[0, video_duration]`.
    pub fn padded(
        interval: &PerformanceInterval,
        lead_padding: f64,
        trail_padding: f64,
        video_duration: f64,
    ) -> Self {
        let start = (interval.start - lead_padding).max(0.0);
        let end = (interval.end + trail_padding).min(video_duration);
        Self { start, end }
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Where a clip's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioSource {
    /// Camera audio mixed with the offset-aligned external recording
    #[default]
    Mixed,
    /// Camera audio replaced by the offset-aligned external recording
    Replaced,
    /// Camera audio only
    Camera,
}

impl AudioSource {
    pub fn uses_external(&self) -> bool {
        !matches!(self, AudioSource::Camera)
    }
}

/// Terminal state of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Deterministic output name of the `n`th (1-based) clip of a video.
pub fn clip_file_name(video_id: &VideoId, n: usize) -> String {
    format!("{}_performance_{}.mp4", video_id, n)
}

/// Record of one clip extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRecord {
    pub video_id: VideoId,
    /// 1-based interval index
    pub index: usize,
    pub interval: PerformanceInterval,
    pub window: ClipWindow,
    /// Offset applied to the external audio, if it was used
    pub offset_secs: Option<f64>,
    pub audio_source: AudioSource,
    pub output_path: PathBuf,
    pub status: ClipStatus,
    /// Encode attempts used
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration of the encoded file as probed after encoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_duration: Option<f64>,
    /// Probed duration differs from the window by more than one frame
    #[serde(default)]
    pub duration_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ClipRecord {
    /// A pending record for an interval about to be encoded.
    pub fn pending(
        video_id: VideoId,
        index: usize,
        interval: PerformanceInterval,
        window: ClipWindow,
        output_path: PathBuf,
    ) -> Self {
        Self {
            video_id,
            index,
            interval,
            window,
            offset_secs: None,
            audio_source: AudioSource::Camera,
            output_path,
            status: ClipStatus::Pending,
            attempts: 0,
            error: None,
            output_duration: None,
            duration_mismatch: false,
            finished_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ClipStatus::Completed
    }

    pub fn mark_completed(&mut self, attempts: u32) {
        self.status = ClipStatus::Completed;
        self.attempts = attempts;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, attempts: u32, error: impl Into<String>) {
        self.status = ClipStatus::Failed;
        self.attempts = attempts;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}
