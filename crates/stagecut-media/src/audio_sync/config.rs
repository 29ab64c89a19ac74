//! Configuration for audio offset estimation.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// How the embedded track is compared against the external one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Correlate the whole embedded track once
    #[default]
    Whole,
    /// Correlate several chunks separately and take the consensus
    Chunked,
}

/// Audio synchronization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Both tracks are resampled to this rate (Hz)
    pub sample_rate: u32,

    /// Rate of the RMS envelope used for the coarse search (Hz).
    ///
    /// 100 Hz gives 10 ms coarse resolution; the sample-level refinement
    /// takes it from there.
    pub envelope_rate: f64,

    /// Centre of the lag search window (seconds, `mic_time - video_time`)
    pub expected_offset_secs: f64,

    /// Half-width of the lag search window (seconds)
    pub max_search_secs: f64,

    /// Minimum overlap of the two tracks for a lag to be considered (seconds)
    pub min_overlap_secs: f64,

    /// Length of the excerpt correlated at sample resolution (seconds)
    pub refine_window_secs: f64,

    /// Peak correlation below this is reported as low confidence
    pub min_confidence: f64,

    pub strategy: SyncStrategy,

    /// Chunks compared with the `chunked` strategy
    pub chunk_count: usize,

    /// Length of each chunk (seconds)
    pub chunk_secs: f64,

    /// Chunk offsets within this distance of each other agree (seconds)
    pub consensus_tolerance_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            envelope_rate: 100.0,
            expected_offset_secs: 0.0,
            max_search_secs: 1800.0,
            min_overlap_secs: 10.0,
            refine_window_secs: 10.0,
            min_confidence: 0.4,
            strategy: SyncStrategy::Whole,
            chunk_count: 5,
            chunk_secs: 30.0,
            consensus_tolerance_secs: 1.0,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> MediaResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if self.sample_rate < 1000 {
            return Err(MediaError::invalid_config("sync.sample_rate must be >= 1000"));
        }
        if !positive(self.envelope_rate) || self.envelope_rate > self.sample_rate as f64 / 2.0 {
            return Err(MediaError::invalid_config(
                "sync.envelope_rate must be > 0 and at most half the sample rate",
            ));
        }
        if !self.expected_offset_secs.is_finite() || !positive(self.max_search_secs) {
            return Err(MediaError::invalid_config(
                "sync.max_search_secs must be > 0 and expected_offset_secs finite",
            ));
        }
        if !positive(self.min_overlap_secs) || !positive(self.refine_window_secs) {
            return Err(MediaError::invalid_config(
                "sync.min_overlap_secs and refine_window_secs must be > 0",
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_confidence) {
            return Err(MediaError::invalid_config(
                "sync.min_confidence must be within [-1, 1]",
            ));
        }
        if self.chunk_count == 0 || !positive(self.chunk_secs) {
            return Err(MediaError::invalid_config(
                "sync.chunk_count must be >= 1 and chunk_secs > 0",
            ));
        }
        if !positive(self.consensus_tolerance_secs) {
            return Err(MediaError::invalid_config(
                "sync.consensus_tolerance_secs must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_strategy_serialization() {
        let config: SyncConfig = serde_json::from_str(r#"{"strategy": "chunked"}"#).unwrap();
        assert_eq!(config.strategy, SyncStrategy::Chunked);
        assert_eq!(config.sample_rate, 22050);
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let config = SyncConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
