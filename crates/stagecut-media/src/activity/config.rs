//! Configuration for motion detection.
//!
//! The variance defaults follow the classic adaptive Gaussian background
//! model (initial variance 15, bounds 4..75, threshold 40 on the squared
//! Mahalanobis distance). Areas are in analysis-frame pixels.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Background-subtraction and blob extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// A pixel is foreground when `d² / variance` exceeds this value.
    ///
    /// - Lower values (16-25): sensitive, picks up lighting flicker
    /// - Default (40): balanced for stage lighting
    /// - Higher values (64+): only strong contrast moves
    pub variance_threshold: f32,

    /// Variance assigned to every pixel when the model is initialized.
    pub initial_variance: f32,

    /// Lower variance bound; keeps perfectly static pixels from becoming
    /// hypersensitive.
    pub min_variance: f32,

    /// Upper variance bound.
    pub max_variance: f32,

    /// Per-frame adaptation rate for background pixels.
    pub learning_rate: f32,

    /// Multiplier on `learning_rate` for the mean of pixels currently
    /// classified as foreground. Their variance is never updated.
    ///
    /// - Default (0.0): foreground is frozen out of the model, so a performer
    ///   standing still for minutes is not absorbed and leaves no ghost
    /// - Above 0: permanent scene changes (props, lighting) eventually fade
    ///   into the background, at the cost of absorbing still performers
    pub foreground_learning_scale: f32,

    /// Radius of the square kernel used for opening and closing.
    pub morph_radius: u32,

    /// Smallest connected component reported as a blob (pixels).
    pub min_blob_area: u32,

    /// Frames used only to learn the background before blobs are reported.
    pub warmup_frames: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 40.0,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            learning_rate: 0.005,
            foreground_learning_scale: 0.0,
            morph_radius: 1,
            min_blob_area: 80,
            warmup_frames: 5,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> MediaResult<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if !positive(self.variance_threshold) {
            return Err(MediaError::invalid_config(
                "detection.variance_threshold must be > 0",
            ));
        }
        if !positive(self.min_variance) || !positive(self.max_variance) {
            return Err(MediaError::invalid_config(
                "detection.min_variance and max_variance must be > 0",
            ));
        }
        if self.min_variance > self.max_variance {
            return Err(MediaError::invalid_config(
                "detection.min_variance must not exceed max_variance",
            ));
        }
        if !(self.initial_variance >= self.min_variance && self.initial_variance <= self.max_variance)
        {
            return Err(MediaError::invalid_config(
                "detection.initial_variance must lie within [min_variance, max_variance]",
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(MediaError::invalid_config(
                "detection.learning_rate must be in (0, 1]",
            ));
        }
        if !(self.foreground_learning_scale >= 0.0 && self.foreground_learning_scale <= 1.0) {
            return Err(MediaError::invalid_config(
                "detection.foreground_learning_scale must be in [0, 1]",
            ));
        }
        if self.min_blob_area == 0 {
            return Err(MediaError::invalid_config(
                "detection.min_blob_area must be >= 1",
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
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_variance_bounds() {
        let config = DetectorConfig {
            min_variance: 80.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_learning_rate() {
        let config = DetectorConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
