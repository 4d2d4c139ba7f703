//! Progressive merge.
//!
//! Baked segment files are folded into a single accumulator one at a time,
//! so no step holds more than two decoders open.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use reel_models::EncodingConfig;

use crate::backend::{EncodeRequest, MediaBackend};
use crate::clip::Clip;
use crate::error::{EngineResult, MediaResult};
use crate::fs_utils;
use crate::metrics;
use crate::reaper::{HandleRegistry, Release};

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub path: PathBuf,
    /// Files that made it into the accumulator
    pub merged: usize,
    /// Files dropped after a failed step
    pub dropped: usize,
}

/// Folds baked files into an accumulator file.
pub struct ProgressiveMerge<'a> {
    backend: &'a dyn MediaBackend,
    registry: &'a HandleRegistry,
    encoding: &'a EncodingConfig,
    accumulator: PathBuf,
    temp: PathBuf,
}

impl<'a> ProgressiveMerge<'a> {
    /// `accumulator` receives the result; `temp` holds each step's output
    /// before it replaces the accumulator.
    pub fn new(
        backend: &'a dyn MediaBackend,
        registry: &'a HandleRegistry,
        encoding: &'a EncodingConfig,
        accumulator: impl Into<PathBuf>,
        temp: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            registry,
            encoding,
            accumulator: accumulator.into(),
            temp: temp.into(),
        }
    }

    /// Merge `files` in order. `None` when there is nothing to merge.
    ///
    /// Input files are deleted once consumed. A failing step is logged and
    /// its file dropped; the accumulator is left as it was.
    pub async fn merge(
        &self,
        files: &[PathBuf],
        mut on_step: impl FnMut(usize, usize) + Send,
    ) -> EngineResult<Option<MergeOutcome>> {
        let Some((first, rest)) = files.split_first() else {
            return Ok(None);
        };
        let total = files.len();

        fs_utils::copy_file(first, &self.accumulator).await?;
        consume(first).await;
        let mut merged = 1;
        let mut dropped = 0;
        on_step(1, total);

        for (i, next) in rest.iter().enumerate() {
            match self.step(next).await {
                Ok(()) => merged += 1,
                Err(e) => {
                    warn!(
                        path = %next.display(),
                        stage = "merge",
                        error = %e,
                        "Merge step failed, dropping clip"
                    );
                    metrics::record_merge_step_failed();
                    if let Err(e) = fs_utils::remove_if_exists(&self.temp).await {
                        warn!(path = %self.temp.display(), error = %e, "Failed to remove merge scratch file");
                    }
                    dropped += 1;
                }
            }
            consume(next).await;
            on_step(i + 2, total);
        }

        info!(
            output = %self.accumulator.display(),
            merged,
            dropped,
            "Merged baked segments"
        );
        Ok(Some(MergeOutcome {
            path: self.accumulator.clone(),
            merged,
            dropped,
        }))
    }

    /// Append `next` to the accumulator.
    async fn step(&self, next: &Path) -> MediaResult<()> {
        let acc_info = self.backend.probe(&self.accumulator).await?;
        let next_info = self.backend.probe(next).await?;

        let acc = Clip::source(self.registry, &self.accumulator, &acc_info);
        let part = Clip::source(self.registry, next, &next_info);
        let mut joined = Clip::concat(vec![acc, part])?;

        let result = self
            .backend
            .encode(EncodeRequest::video(&joined, &self.temp, self.encoding))
            .await;
        let report = joined.release();
        debug!(handles = report.handles_closed, "Released merge inputs");
        result?;

        fs_utils::remove_if_exists(&self.accumulator).await?;
        fs_utils::move_file(&self.temp, &self.accumulator).await
    }
}

async fn consume(path: &Path) {
    if let Err(e) = fs_utils::remove_if_exists(path).await {
        warn!(path = %path.display(), error = %e, "Failed to delete baked clip");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{write_fake_video, FakeBackend};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        backend: FakeBackend,
        registry: HandleRegistry,
        encoding: EncodingConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                backend: FakeBackend::new(),
                registry: HandleRegistry::new(),
                encoding: EncodingConfig::default(),
            }
        }

        fn merger(&self) -> ProgressiveMerge<'_> {
            ProgressiveMerge::new(
                &self.backend,
                &self.registry,
                &self.encoding,
                self.dir.path().join("temp-merged-video.mp4"),
                self.dir.path().join("temp-merged-next.mp4"),
            )
        }

        fn baked(&self, n: usize, duration: f64) -> PathBuf {
            let path = self.dir.path().join(format!("seg-{}.mp4", n));
            write_fake_video(&path, 1080, 1920, duration).unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_no_files() {
        let fx = Fixture::new();
        assert_eq!(fx.merger().merge(&[], |_, _| {}).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_single_file_is_byte_copy() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("seg-1.mp4");
        let bytes: Vec<u8> = (0..=255).collect();
        std::fs::write(&path, &bytes).unwrap();

        let outcome = fx.merger().merge(&[path.clone()], |_, _| {}).await.unwrap().unwrap();
        assert_eq!(std::fs::read(&outcome.path).unwrap(), bytes);
        assert_eq!(outcome.merged, 1);
        assert!(fx.backend.encodes().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_progressive_merge_bounds_open_decoders() {
        let fx = Fixture::new();
        let files: Vec<PathBuf> = (1..=5).map(|n| fx.baked(n, 2.0)).collect();
        let mut steps = Vec::new();

        let outcome = fx
            .merger()
            .merge(&files, |done, total| steps.push((done, total)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.merged, 5);
        assert_eq!(fx.registry.peak(), 2);
        assert_eq!(fx.registry.open_count(), 0);
        let encodes = fx.backend.encodes();
        assert_eq!(encodes.len(), 4);
        assert!(encodes.iter().all(|e| e.open_handles == 2));
        let info = fx.backend.probe(&outcome.path).await.unwrap();
        assert!((info.duration - 10.0).abs() < 1e-6);
        assert_eq!(steps.last(), Some(&(5, 5)));
        assert!(files.iter().all(|f| !f.exists()));
        assert!(!fx.dir.path().join("temp-merged-next.mp4").exists());
    }

    #[tokio::test]
    async fn test_failed_step_keeps_accumulator() {
        let fx = Fixture::new();
        let files: Vec<PathBuf> = vec![fx.baked(1, 2.0), fx.baked(2, 3.0), fx.baked(3, 4.0)];
        fx.backend.fail_encode_matching("seg-2");

        let outcome = fx.merger().merge(&files, |_, _| {}).await.unwrap().unwrap();
        assert_eq!((outcome.merged, outcome.dropped), (2, 1));
        let info = fx.backend.probe(&outcome.path).await.unwrap();
        assert!((info.duration - 6.0).abs() < 1e-6);
    }
}
