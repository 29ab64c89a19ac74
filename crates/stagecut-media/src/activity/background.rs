//! Adaptive per-pixel Gaussian background model.

use image::GrayImage;

use super::config::DetectorConfig;
use super::morphology::ForegroundMask;
use crate::error::{MediaError, MediaResult};

/// Running mean and variance of every pixel of a fixed-size frame.
///
/// The model is uninitialized until the first frame arrives; that frame
/// seeds the means. One model belongs to exactly one video.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    config: DetectorConfig,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u64,
}

impl BackgroundModel {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.frames_seen > 0
    }

    /// Frames absorbed since the last reset.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Whether the model is still in its learn-only warm-up.
    pub fn is_warming_up(&self) -> bool {
        self.frames_seen <= self.config.warmup_frames as u64
    }

    /// Return to the uninitialized state.
    pub fn reset(&mut self) {
        self.width = 0;
        self.height = 0;
        self.mean.clear();
        self.variance.clear();
        self.frames_seen = 0;
    }

    /// Classify every pixel of `image` and fold it into the model.
    ///
    /// Returns the raw (pre-morphology) foreground mask, or `None` while the
    /// model is warming up.
    pub fn apply(&mut self, image: &GrayImage) -> MediaResult<Option<ForegroundMask>> {
        let (width, height) = image.dimensions();

        if !self.is_initialized() {
            self.width = width;
            self.height = height;
            self.mean = image.as_raw().iter().map(|&p| p as f32).collect();
            self.variance = vec![self.config.initial_variance; self.mean.len()];
            self.frames_seen = 1;
            return Ok(if self.is_warming_up() {
                None
            } else {
                Some(ForegroundMask::new(width, height))
            });
        }

        if (width, height) != (self.width, self.height) {
            return Err(MediaError::FrameSizeMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }

        self.frames_seen += 1;
        let warming_up = self.is_warming_up();
        let cfg = &self.config;

        // Learn faster while warming up so the first frames average out
        let base_rate = if warming_up {
            cfg.learning_rate.max(1.0 / self.frames_seen as f32)
        } else {
            cfg.learning_rate
        };
        let foreground_rate = base_rate * cfg.foreground_learning_scale;

        let mut bits = vec![false; self.mean.len()];
        for (i, &pixel) in image.as_raw().iter().enumerate() {
            let d = pixel as f32 - self.mean[i];
            let d2 = d * d;
            let var = self.variance[i];
            let foreground = !warming_up && d2 > cfg.variance_threshold * var;

            if foreground {
                // Foreground never widens the variance band
                self.mean[i] += foreground_rate * d;
            } else {
                self.mean[i] += base_rate * d;
                self.variance[i] =
                    (var + base_rate * (d2 - var)).clamp(cfg.min_variance, cfg.max_variance);
            }
            bits[i] = foreground;
        }

        if warming_up {
            return Ok(None);
        }
        ForegroundMask::from_bits(width, height, bits)
            .map(Some)
            .ok_or_else(|| MediaError::internal("mask size mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn flat(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            warmup_frames: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_static_scene_has_no_foreground() {
        let mut model = BackgroundModel::new(config());
        for _ in 0..20 {
            if let Some(mask) = model.apply(&flat(16, 16, 60)).unwrap() {
                assert_eq!(mask.count(), 0);
            }
        }
        assert!(!model.is_warming_up());
    }

    #[test]
    fn test_bright_region_is_foreground() {
        let mut model = BackgroundModel::new(config());
        for _ in 0..5 {
            model.apply(&flat(16, 16, 60)).unwrap();
        }

        let mut frame = flat(16, 16, 60);
        for y in 4..8 {
            for x in 4..8 {
                frame.put_pixel(x, y, Luma([220]));
            }
        }
        let mask = model.apply(&frame).unwrap().unwrap();
        assert_eq!(mask.count(), 16);
        assert!(mask.get(5, 5));
        assert!(!mask.get(0, 0));
    }

    fn with_block(value: u8) -> GrayImage {
        let mut frame = flat(16, 16, 40);
        for y in 4..8 {
            for x in 4..8 {
                frame.put_pixel(x, y, Luma([value]));
            }
        }
        frame
    }

    #[test]
    fn test_still_object_is_never_absorbed_and_leaves_no_ghost() {
        for value in [230u8, 100] {
            let mut model = BackgroundModel::new(config());
            for _ in 0..5 {
                model.apply(&flat(16, 16, 40)).unwrap();
            }

            // Ten minutes at 5 fps without moving
            for frame in 0..3000 {
                let mask = model.apply(&with_block(value)).unwrap().unwrap();
                assert_eq!(mask.count(), 16, "value {value} absorbed at frame {frame}");
            }

            let mask = model.apply(&flat(16, 16, 40)).unwrap().unwrap();
            assert_eq!(mask.count(), 0, "value {value} left a ghost");
        }
    }

    #[test]
    fn test_foreground_scale_is_tunable() {
        let mut model = BackgroundModel::new(DetectorConfig {
            warmup_frames: 2,
            learning_rate: 0.5,
            foreground_learning_scale: 1.0,
            ..Default::default()
        });
        for _ in 0..5 {
            model.apply(&flat(16, 16, 40)).unwrap();
        }

        let mut absorbed = false;
        for _ in 0..50 {
            if model.apply(&with_block(100)).unwrap().unwrap().count() == 0 {
                absorbed = true;
                break;
            }
        }
        assert!(absorbed);
    }

    #[test]
    fn test_warmup_returns_none() {
        let mut model = BackgroundModel::new(config());
        assert!(model.apply(&flat(8, 8, 10)).unwrap().is_none());
        assert!(model.apply(&flat(8, 8, 10)).unwrap().is_none());
        assert!(model.apply(&flat(8, 8, 10)).unwrap().is_some());
    }

    #[test]
    fn test_size_mismatch_rejected_and_reset_recovers() {
        let mut model = BackgroundModel::new(config());
        model.apply(&flat(8, 8, 10)).unwrap();

        let err = model.apply(&flat(16, 8, 10)).unwrap_err();
        assert!(matches!(err, MediaError::FrameSizeMismatch { .. }));

        model.reset();
        assert!(!model.is_initialized());
        assert!(model.apply(&flat(16, 8, 10)).is_ok());
    }
}
