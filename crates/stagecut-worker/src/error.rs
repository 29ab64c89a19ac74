//! Worker error types.

use stagecut_media::{MediaError, SyncError};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The video could not be probed or decoded. Fatal for that video only.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("No performance intervals detected in {0}")]
    NoIntervalsDetected(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    /// Invalid thresholds or caller misuse. Terminates the batch.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn decode_failure(msg: impl Into<String>) -> Self {
        Self::DecodeFailure(msg.into())
    }

    pub fn encode_failure(msg: impl Into<String>) -> Self {
        Self::EncodeFailure(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a configuration validation failure from the media layer.
    pub fn from_config(err: MediaError) -> Self {
        match err {
            MediaError::InvalidConfig(msg) => Self::ConfigurationError(msg),
            other => Self::ConfigurationError(other.to_string()),
        }
    }

    /// Whether another encode attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_transient(),
            WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        let err = WorkerError::from_config(MediaError::invalid_config("clips.max_attempts must be >= 1"));
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Configuration error: clips.max_attempts must be >= 1"
        );
    }

    #[test]
    fn test_media_retryability_follows_transience() {
        let transient = WorkerError::from(MediaError::ffmpeg_failed("exit 1", None, Some(1)));
        assert!(transient.is_retryable());

        let permanent = WorkerError::from(MediaError::FfmpegNotFound);
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_sync_error_keeps_cause() {
        let err = WorkerError::from(SyncError::NoAudioStream("mic.wav".into()));
        assert!(err.to_string().starts_with("Sync error: "));
        assert!(err.to_string().contains("mic.wav"));
    }
}
