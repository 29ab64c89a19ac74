//! Joining a recording that the camera split into several files.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Render a concat-demuxer list. Single quotes in paths are escaped as `'\''`.
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Concatenate `segments` (same codec parameters) into `output` without re-encoding.
pub async fn concat_segments(
    segments: &[PathBuf],
    output: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
) -> MediaResult<()> {
    let output = output.as_ref();

    if segments.is_empty() {
        return Err(MediaError::internal("no segments to concatenate"));
    }
    for segment in segments {
        if !segment.exists() {
            return Err(MediaError::FileNotFound(segment.clone()));
        }
    }

    // Absolute paths so the list resolves regardless of where it lives
    let absolute: Vec<PathBuf> = segments
        .iter()
        .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
        .collect();

    let list = tempfile::Builder::new()
        .prefix("concat_")
        .suffix(".txt")
        .tempfile_in(work_dir.as_ref())?;
    let mut file = tokio::fs::File::create(list.path()).await?;
    file.write_all(concat_list(&absolute).as_bytes()).await?;
    file.flush().await?;
    drop(file);

    info!(
        segments = segments.len(),
        output = %output.display(),
        "Concatenating video segments"
    );

    let cmd = FfmpegCommand::new(list.path(), output)
        .input_args(["-f", "concat", "-safe", "0"])
        .output_args(["-map", "0", "-c", "copy"]);

    FfmpegRunner::new().run(&cmd).await
}
