//! Source video identity and per-video status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier of a source video, derived from its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Derive the id from a path's file stem (`/in/show_a.mp4` -> `show_a`).
    ///
    /// Falls back to `video` for paths without a usable stem.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let stem = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "video".to_string());
        Self(stem)
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Video is being processed
    #[default]
    Processing,
    /// Every interval produced a clip
    Completed,
    /// At least one clip failed, others succeeded
    PartiallyCompleted,
    /// Analysis found no performance intervals
    NoIntervals,
    /// Decoding or every clip failed
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::PartiallyCompleted => "partially_completed",
            VideoStatus::NoIntervals => "no_intervals",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, VideoStatus::Processing)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_from_path() {
        assert_eq!(VideoId::from_path("/in/show_a.mp4").as_str(), "show_a");
        assert_eq!(VideoId::from_path("00001.MTS").as_str(), "00001");
        assert_eq!(VideoId::from_path("/").as_str(), "video");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&VideoStatus::NoIntervals).unwrap();
        assert_eq!(json, "\"no_intervals\"");
        assert!(VideoStatus::Failed.is_terminal());
        assert!(!VideoStatus::Processing.is_terminal());
    }
}
