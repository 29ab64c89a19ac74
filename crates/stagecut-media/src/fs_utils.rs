//! Filesystem helpers for publishing encoded files.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV (cross-device link) on Linux and macOS.
const EXDEV: i32 = 18;

/// Sibling path an encoder writes to before the file is published,
/// e.g. `show_performance_1.mp4` -> `show_performance_1.partial.mp4`.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let ext = final_path
        .extension()
        .map(|e| format!("partial.{}", e.to_string_lossy()))
        .unwrap_or_else(|| "partial".to_string());
    final_path.with_extension(ext)
}

/// Move a file from `src` to `dst`, replacing `dst` if it exists.
///
/// Tries a rename first; when the paths are on different filesystems the
/// file is copied to a temporary sibling of `dst`, renamed into place, and
/// the source removed.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("tmp");

    if let Err(e) = fs::copy(src, &staging).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
    }

    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
