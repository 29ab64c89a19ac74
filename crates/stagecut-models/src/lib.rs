//! Shared data models for StageCut.
//!
//! This crate provides Serde-serializable types for:
//! - Frame geometry (points, bounding boxes, the stage region)
//! - Per-frame blobs and tracked-object snapshots
//! - Performance intervals and audio offsets
//! - Clip windows, clip records and encoding configuration

pub mod clip;
pub mod encoding;
pub mod geometry;
pub mod interval;
pub mod offset;
pub mod track;
pub mod video;

// Re-export common types
pub use clip::{clip_file_name, AudioSource, ClipRecord, ClipStatus, ClipWindow};
pub use encoding::{EncodingConfig, VideoEncoder};
pub use geometry::{BoundingBox, Point, StageRegion, StageRegionError};
pub use interval::{IntervalQuality, PerformanceInterval};
pub use offset::{AudioOffset, SyncMethod};
pub use track::{Blob, TrackId, TrackSnapshot, TrackState};
pub use video::{VideoId, VideoStatus};
