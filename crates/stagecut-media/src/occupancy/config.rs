//! Configuration for stage occupancy and interval filtering.

use serde::{Deserialize, Serialize};
use stagecut_models::StageRegion;

use crate::error::{MediaError, MediaResult};

/// Occupancy parameters. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
    /// Region of the frame that counts as the stage
    pub stage: StageRegion,

    /// Longest absence bridged without ending the interval.
    ///
    /// Covers a performer briefly occluded or standing still long enough
    /// to drop out of the foreground.
    pub gap_tolerance_secs: f64,

    /// Raw intervals closer than this are merged. Must be at least
    /// `gap_tolerance_secs`.
    pub merge_tolerance_secs: f64,

    /// Intervals shorter than this (after merging) are discarded.
    pub min_duration_secs: f64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            stage: StageRegion::default(),
            gap_tolerance_secs: 3.0,
            merge_tolerance_secs: 10.0,
            min_duration_secs: 30.0,
        }
    }
}

impl OccupancyConfig {
    pub fn validate(&self) -> MediaResult<()> {
        self.stage
            .validate()
            .map_err(|e| MediaError::invalid_config(format!("occupancy.stage: {}", e)))?;

        if !(self.gap_tolerance_secs.is_finite() && self.gap_tolerance_secs >= 0.0) {
            return Err(MediaError::invalid_config(
                "occupancy.gap_tolerance_secs must be >= 0",
            ));
        }
        if !(self.merge_tolerance_secs.is_finite()
            && self.merge_tolerance_secs >= self.gap_tolerance_secs)
        {
            return Err(MediaError::invalid_config(
                "occupancy.merge_tolerance_secs must be >= gap_tolerance_secs",
            ));
        }
        if !(self.min_duration_secs.is_finite() && self.min_duration_secs > 0.0) {
            return Err(MediaError::invalid_config(
                "occupancy.min_duration_secs must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_must_cover_gap() {
        let config = OccupancyConfig {
            gap_tolerance_secs: 5.0,
            merge_tolerance_secs: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(OccupancyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_stage_rejected() {
        let config = OccupancyConfig {
            stage: StageRegion::new(0.8, 0.0, 0.5, 1.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
