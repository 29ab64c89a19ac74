//! StageCut pipeline driver.
//!
//! This crate provides:
//! - Layered configuration (JSON file, `STAGECUT_*` environment, CLI flags)
//! - Clip orchestration with retry, per-attempt timeout and a shared encode limit
//! - The per-video pipeline and the batch runner with its JSON report
//! - Structured logging helpers, Prometheus metrics and an observer hook

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;

pub use batch::{BatchReport, BatchRunner, BatchTotals};
pub use config::{AudioMode, BatchConfig, ClipConfig, PipelineConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::VideoLogger;
pub use observer::{LoggingObserver, NoopObserver, PipelineObserver};
pub use orchestrator::{ClipOrchestrator, VideoContext};
pub use pipeline::{VideoJob, VideoPipeline, VideoReport};
pub use retry::{retry_async, retry_async_if, RetryConfig, RetryResult};
