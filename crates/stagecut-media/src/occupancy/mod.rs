//! Stage occupancy: from tracked objects to performance intervals.
//!
//! The [`OccupancyMachine`] emits raw intervals frame by frame;
//! [`post_process`] merges fragments and drops short intervals.

mod config;
mod machine;
mod postprocess;

pub use config::OccupancyConfig;
pub use machine::{OccupancyMachine, OccupancyPhase};
pub use postprocess::{post_process, DiscardedInterval, OccupancyReport};
