#![deny(unreachable_patterns)]
//! Media layer for StageCut.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building, running and progress parsing
//! - Probing, segment concatenation and analysis-frame decoding
//! - Motion detection, object tracking and stage occupancy
//! - Audio offset estimation between a camera and an external microphone
//! - Clip encoding behind the [`EncodeBackend`] seam

pub mod activity;
pub mod audio_sync;
pub mod clip;
pub mod command;
pub mod concat;
pub mod error;
pub mod frame_source;
pub mod fs_utils;
pub mod occupancy;
pub mod probe;
pub mod progress;
pub mod segmentation;
pub mod tracker;

pub use activity::{detect, BackgroundModel, DetectorConfig, ForegroundMask};
pub use audio_sync::{
    estimate_from_samples, AudioSynchronizer, SyncConfig, SyncError, SyncOutcome, SyncResult,
    SyncStrategy,
};
pub use clip::{
    build_encode_command, resolve_encoding, AudioMix, EncodeBackend, EncodeJob, FfmpegBackend,
};
pub use command::{check_ffmpeg, check_ffprobe, create_ffmpeg_command, FfmpegCommand, FfmpegRunner};
pub use concat::concat_segments;
pub use error::{MediaError, MediaResult};
pub use frame_source::{Frame, FrameSource, FrameSourceConfig, FrameStream, MemoryFrameStream};
pub use occupancy::{
    DiscardedInterval, OccupancyConfig, OccupancyMachine, OccupancyPhase, OccupancyReport,
};
pub use probe::{get_duration, probe_media, probe_video, MediaInfo, VideoInfo};
pub use progress::FfmpegProgress;
pub use segmentation::{segment_stream, SegmentationConfig, SegmentationOutput, Segmenter};
pub use tracker::{ObjectTracker, TrackerConfig};
