//! Audio offset between an external microphone and a camera's embedded audio.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the offset was estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Whole embedded track correlated against the whole external track
    #[default]
    Whole,
    /// Consensus of several embedded-track chunks
    Chunked,
    /// No estimate was possible; a zero offset is used
    Fallback,
}

/// Constant time shift aligning the external recording to the video.
///
/// `offset_secs` is `mic_time - video_time`: a sound heard at video time `t`
/// appears at `t + offset_secs` in the external recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioOffset {
    pub offset_secs: f64,
    /// Normalized correlation at the peak, in [-1, 1]
    pub confidence: f64,
    /// Sample rate both tracks were resampled to
    pub sample_rate: u32,
    pub method: SyncMethod,
    /// Confidence fell below the configured threshold
    pub low_confidence: bool,
}

impl AudioOffset {
    /// A zero offset used when synchronization is unavailable.
    pub fn fallback() -> Self {
        Self {
            offset_secs: 0.0,
            confidence: 0.0,
            sample_rate: 0,
            method: SyncMethod::Fallback,
            low_confidence: true,
        }
    }

    /// Map a video timestamp to the external recording's timeline.
    #[inline]
    pub fn to_mic_time(&self, video_time: f64) -> f64 {
        video_time + self.offset_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mic_time_mapping() {
        let offset = AudioOffset {
            offset_secs: 12.5,
            confidence: 0.9,
            sample_rate: 22050,
            method: SyncMethod::Whole,
            low_confidence: false,
        };
        assert!((offset.to_mic_time(30.0) - 42.5).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_is_flagged() {
        let offset = AudioOffset::fallback();
        assert!(offset.low_confidence);
        assert_eq!(offset.method, SyncMethod::Fallback);
        assert_eq!(offset.offset_secs, 0.0);
    }
}
