//! Task-directory file helpers.
//!
//! Renames fall back to copy + delete across filesystems (EXDEV), which
//! happens when the tasks root and an explicit output live on different
//! mounts.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, replacing `dst` if present.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("partial");
    fs::copy(src, &staging).await?;
    if let Err(e) = fs::rename(&staging, dst).await {
        if let Err(cleanup) = fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging file");
        }
        return Err(e.into());
    }
    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), error = %e, "Failed to remove moved file");
    }
    Ok(())
}

/// Byte copy `src` to `dst`, creating the parent directory.
pub async fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<u64> {
    let dst = dst.as_ref();
    ensure_parent(dst).await?;
    Ok(fs::copy(src.as_ref(), dst).await?)
}

/// Remove a file; a missing file is not an error. Returns whether a file
/// was deleted.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Whether `path` is a regular file with at least one byte.
pub async fn is_non_empty_file(path: impl AsRef<Path>) -> bool {
    fs::metadata(path.as_ref())
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp-merged-next.mp4");
        let dst = dir.path().join("temp-merged-video.mp4");
        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("clips").join("b.mp4");
        fs::write(&src, b"abc").await.unwrap();

        assert_eq!(copy_file(&src, &dst).await.unwrap(), 3);
        assert!(src.exists());
        assert!(is_non_empty_file(&dst).await);
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.mp4");
        assert!(!remove_if_exists(&path).await.unwrap());
        fs::write(&path, b"").await.unwrap();
        assert!(!is_non_empty_file(&path).await);
        assert!(remove_if_exists(&path).await.unwrap());
    }
}
