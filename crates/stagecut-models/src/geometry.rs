//! Frame geometry: points, pixel boxes and the normalized stage region.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in analysis-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from inclusive pixel extents, as produced by a component scan.
    pub fn from_extents(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x as f64,
            y: min_y as f64,
            width: (max_x - min_x + 1) as f64,
            height: (max_y - min_y + 1) as f64,
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Whether the point lies inside the box (left/top inclusive, right/bottom exclusive).
    #[inline]
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x && point.x < self.x2() && point.y >= self.y && point.y < self.y2()
    }
}

/// Errors for an ill-formed stage region.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageRegionError {
    #[error("stage region {0:?} is outside the unit square or has zero area")]
    OutOfBounds(StageRegion),
}

/// The image area treated as "on stage", in normalized frame coordinates.
///
/// The defaults exclude the outer 15% on each side, where performers queue
/// and walk off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageRegion {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the region (0.0 to 1.0)
    pub width: f64,
    /// Height of the region (0.0 to 1.0)
    pub height: f64,
}

impl Default for StageRegion {
    fn default() -> Self {
        Self {
            x: 0.15,
            y: 0.0,
            width: 0.70,
            height: 1.0,
        }
    }
}

impl StageRegion {
    /// Create a new normalized region.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Region spanning the full frame height between two horizontal fractions.
    pub fn horizontal_band(left: f64, right: f64) -> Self {
        Self::new(left, 0.0, right - left, 1.0)
    }

    /// Check the region lies within the unit square with positive area.
    pub fn validate(&self) -> Result<(), StageRegionError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        let valid = finite
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.001 // Allow small epsilon for float precision
            && self.y + self.height <= 1.001;

        if valid {
            Ok(())
        } else {
            Err(StageRegionError::OutOfBounds(*self))
        }
    }

    /// Convert to a pixel box for a frame of the given size.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let w = frame_width as f64;
        let h = frame_height as f64;
        BoundingBox::new(self.x * w, self.y * h, self.width * w, self.height * h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_matches_center_band() {
        let stage = StageRegion::default();
        assert!(stage.validate().is_ok());
        let px = stage.to_pixels(320, 180);
        assert!((px.x - 48.0).abs() < 1e-9);
        assert!((px.x2() - 272.0).abs() < 1e-9);
        assert!((px.height - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_stage_rejected() {
        assert!(StageRegion::new(0.5, 0.0, 0.6, 1.0).validate().is_err());
        assert!(StageRegion::new(0.1, 0.0, 0.0, 1.0).validate().is_err());
        assert!(StageRegion::new(f64::NAN, 0.0, 0.5, 1.0).validate().is_err());
    }

    #[test]
    fn test_box_contains_is_half_open() {
        let b = BoundingBox::new(10.0, 10.0, 5.0, 5.0);
        assert!(b.contains(&Point::new(10.0, 10.0)));
        assert!(b.contains(&Point::new(14.9, 14.9)));
        assert!(!b.contains(&Point::new(15.0, 12.0)));
    }

    #[test]
    fn test_from_extents_is_inclusive() {
        let b = BoundingBox::from_extents(2, 3, 4, 3);
        assert_eq!(b.width, 3.0);
        assert_eq!(b.height, 1.0);
    }
}
