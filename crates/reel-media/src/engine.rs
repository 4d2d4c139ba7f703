//! Engine facade: planning, rendering and thumbnails for one task directory.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use validator::Validate;

use reel_models::{
    validate_timeline, ConcatMode, EncodingConfig, RenderParams, SegmentDescriptor, TaskId,
};

use crate::backend::{FfmpegBackend, MediaBackend};
use crate::bake::Baker;
use crate::error::{EngineError, EngineResult};
use crate::fs_utils;
use crate::layout::{preview_tag, TaskPaths};
use crate::merge::ProgressiveMerge;
use crate::metrics;
use crate::mux::{resolve_font, MuxRequest, Muxer};
use crate::planner;
use crate::progress::{ProgressSink, RenderStage};
use crate::reaper::HandleRegistry;
use crate::store;
use crate::thumbnail::Thumbnailer;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parent of every task directory
    pub tasks_root: PathBuf,
    /// Pool sampled for `bgm_type=random`
    pub music_dir: Option<PathBuf>,
    /// Lookup directory for relative font names
    pub font_dir: Option<PathBuf>,
    /// Kill FFmpeg runs after this many seconds
    pub ffmpeg_timeout_secs: Option<u64>,
    pub encoding: EncodingConfig,
    /// Bounding box of captured thumbnails
    pub thumbnail_size: u32,
    /// Fixed seed for transition and music choices (tests, reproducible runs)
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tasks_root: PathBuf::from("./storage/tasks"),
            music_dir: None,
            font_dir: None,
            ffmpeg_timeout_secs: None,
            encoding: EncodingConfig::default(),
            thumbnail_size: 640,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tasks_root: std::env::var("REEL_TASKS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tasks_root),
            music_dir: std::env::var("REEL_MUSIC_DIR").ok().map(PathBuf::from),
            font_dir: std::env::var("REEL_FONT_DIR").ok().map(PathBuf::from),
            ffmpeg_timeout_secs: std::env::var("REEL_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            encoding: defaults.encoding,
            thumbnail_size: std::env::var("REEL_THUMBNAIL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.thumbnail_size),
            rng_seed: std::env::var("REEL_RNG_SEED")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn with_tasks_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tasks_root = root.into();
        self
    }

    pub fn with_music_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.music_dir = Some(dir.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub task_id: TaskId,
    pub segments: Vec<SegmentDescriptor>,
    pub params: RenderParams,
    pub narration: Option<PathBuf>,
    pub subtitles: Option<PathBuf>,
    /// Stop after the merge and skip the mux
    pub preview: bool,
    pub preview_label: Option<String>,
}

impl RenderRequest {
    pub fn new(task_id: TaskId, segments: Vec<SegmentDescriptor>, params: RenderParams) -> Self {
        Self {
            task_id,
            segments,
            params,
            narration: None,
            subtitles: None,
            preview: false,
            preview_label: None,
        }
    }

    pub fn with_narration(mut self, path: impl Into<PathBuf>) -> Self {
        self.narration = Some(path.into());
        self
    }

    pub fn with_subtitles(mut self, path: impl Into<PathBuf>) -> Self {
        self.subtitles = Some(path.into());
        self
    }

    pub fn as_preview(mut self, label: Option<String>) -> Self {
        self.preview = true;
        self.preview_label = label;
        self
    }
}

/// Files produced by a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    /// Merged video (`combined-1.mp4`, or `preview-<tag>.mp4` in preview mode)
    pub combined: PathBuf,
    /// Muxed video; absent in preview mode
    pub final_path: Option<PathBuf>,
    pub baked: usize,
    pub skipped: usize,
}

/// Composition engine bound to a media backend.
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn MediaBackend>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(backend: Arc<dyn MediaBackend>, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    /// Engine backed by the FFmpeg CLI.
    pub fn with_ffmpeg(config: EngineConfig) -> Self {
        let backend = match config.ffmpeg_timeout_secs {
            Some(secs) => FfmpegBackend::new().with_timeout(secs),
            None => FfmpegBackend::new(),
        };
        Self::new(Arc::new(backend), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn MediaBackend {
        self.backend.as_ref()
    }

    pub fn task_paths(&self, task_id: &TaskId) -> EngineResult<TaskPaths> {
        TaskPaths::new(&self.config.tasks_root, task_id)
    }

    fn rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Duration of a media file in seconds.
    pub async fn probe_duration(&self, path: &Path) -> EngineResult<f64> {
        Ok(self.backend.probe(path).await?.duration)
    }

    /// Plan a timeline for `task_id` and persist it as `segments.json`.
    pub async fn plan(
        &self,
        task_id: &TaskId,
        materials: &[PathBuf],
        narration_duration: f64,
        mode: ConcatMode,
        max_clip_duration: f64,
    ) -> EngineResult<Vec<SegmentDescriptor>> {
        let paths = self.task_paths(task_id)?;
        let mut rng = self.rng();
        let segments = planner::plan(
            self.backend.as_ref(),
            materials,
            narration_duration,
            mode,
            max_clip_duration,
            &mut rng,
        )
        .await;
        if segments.is_empty() {
            return Err(EngineError::NoMaterials);
        }

        store::save_segments(&paths, &segments).await?;
        info!(task_id = %task_id, segments = segments.len(), "Timeline planned");
        Ok(segments)
    }

    pub async fn save_segments(
        &self,
        task_id: &TaskId,
        segments: &[SegmentDescriptor],
    ) -> EngineResult<()> {
        store::save_segments(&self.task_paths(task_id)?, segments).await
    }

    pub async fn load_segments(&self, task_id: &TaskId) -> EngineResult<Vec<SegmentDescriptor>> {
        store::load_segments(&self.task_paths(task_id)?).await
    }

    /// Bake, merge and (outside preview mode) mux a timeline.
    pub async fn render(
        &self,
        request: RenderRequest,
        progress: &dyn ProgressSink,
    ) -> EngineResult<RenderedOutput> {
        let started = Instant::now();
        let task_id = &request.task_id;
        let paths = self.task_paths(task_id)?;

        request
            .params
            .validate()
            .map_err(|e| EngineError::invalid_input(format!("invalid render params: {}", e)))?;
        let segments = validate_timeline(request.segments.clone())?;
        if segments.is_empty() {
            return Err(EngineError::invalid_input("no segments to render"));
        }
        if !request.preview && request.narration.is_none() {
            return Err(EngineError::invalid_input(
                "narration audio is required for a full render",
            ));
        }
        paths.ensure_dirs().await?;

        let registry = HandleRegistry::new();
        let mut rng = self.rng();
        let (width, height) = request.params.resolution();
        let encoding = self
            .config
            .encoding
            .clone()
            .with_threads(request.params.n_threads);

        // Bake
        let baker = Baker {
            backend: self.backend.as_ref(),
            registry: &registry,
            encoding: &encoding,
            width,
            height,
            global_transition: request.params.video_transition_mode,
        };
        let total = segments.len();
        let mut baked = Vec::with_capacity(total);
        progress.report(RenderStage::Bake, RenderStage::Bake.overall(0, total));
        for (i, segment) in segments.iter().enumerate() {
            let output = paths.baked_clip(i + 1);
            match baker.bake(segment, &output, &mut rng).await {
                Ok(clip) => {
                    metrics::record_segment_baked();
                    baked.push(clip.path);
                }
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        segment_id = %segment.segment_id,
                        path = %segment.material,
                        stage = e.stage.as_str(),
                        error = %e.source,
                        "Skipping segment"
                    );
                    metrics::record_segment_skipped(e.stage.as_str());
                    if let Err(e) = fs_utils::remove_if_exists(&output).await {
                        warn!(path = %output.display(), error = %e, "Failed to remove partial clip");
                    }
                }
            }
            progress.report(RenderStage::Bake, RenderStage::Bake.overall(i + 1, total));
        }
        let skipped = total - baked.len();
        if baked.is_empty() {
            return Err(EngineError::nothing_rendered(format!(
                "all {} segments failed to bake",
                total
            )));
        }

        // Merge
        let merger = ProgressiveMerge::new(
            self.backend.as_ref(),
            &registry,
            &encoding,
            paths.merge_accumulator(),
            paths.merge_temp(),
        );
        let merged = merger
            .merge(&baked, |done, total| {
                progress.report(RenderStage::Merge, RenderStage::Merge.overall(done, total))
            })
            .await?
            .ok_or_else(|| EngineError::nothing_rendered("merge produced no output"))?;

        let combined = if request.preview {
            paths.preview(&preview_tag(request.preview_label.as_deref()))
        } else {
            paths.combined(1)
        };
        fs_utils::move_file(&merged.path, &combined).await?;

        // Mux
        let final_path = match (request.preview, request.narration.as_deref()) {
            (false, Some(narration)) => {
                progress.report(RenderStage::Mux, RenderStage::Mux.overall(0, 1));
                let output = paths.final_output(1);
                let muxer = Muxer::new(self.backend.as_ref(), &registry, &encoding)
                    .with_music_dir(self.config.music_dir.as_deref())
                    .with_font_dir(self.config.font_dir.as_deref());
                let outcome = muxer
                    .mux(
                        MuxRequest {
                            combined: &combined,
                            narration: Some(narration),
                            subtitles: request.subtitles.as_deref(),
                            params: &request.params,
                            output: &output,
                        },
                        &mut rng,
                    )
                    .await?;
                Some(outcome.output)
            }
            _ => None,
        };

        progress.report(RenderStage::Done, 100);
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_render_duration(request.preview, elapsed);
        info!(
            task_id = %task_id,
            baked = baked.len(),
            skipped,
            dropped = merged.dropped,
            preview = request.preview,
            output = %combined.display(),
            elapsed_secs = elapsed,
            "Render finished"
        );

        Ok(RenderedOutput {
            combined,
            final_path,
            baked: merged.merged,
            skipped: skipped + merged.dropped,
        })
    }

    fn thumbnailer<'a>(&'a self, paths: &'a TaskPaths, font: Option<&'a Path>) -> Thumbnailer<'a> {
        Thumbnailer {
            backend: self.backend.as_ref(),
            paths,
            max_side: self.config.thumbnail_size,
            font,
        }
    }

    /// Thumbnail for one segment of the persisted timeline.
    pub async fn get_or_create_thumbnail(
        &self,
        task_id: &TaskId,
        segment_id: &str,
    ) -> EngineResult<PathBuf> {
        let paths = self.task_paths(task_id)?;
        let segments = store::load_segments(&paths).await?;
        let font = resolve_font(&RenderParams::default(), self.config.font_dir.as_deref());
        self.thumbnailer(&paths, font.as_deref())
            .get_or_create(&segments, segment_id)
            .await
    }

    /// Best-effort thumbnails for every persisted segment.
    pub async fn ensure_thumbnails(&self, task_id: &TaskId) -> EngineResult<usize> {
        let paths = self.task_paths(task_id)?;
        let segments = store::load_segments(&paths).await?;
        let font = resolve_font(&RenderParams::default(), self.config.font_dir.as_deref());
        Ok(self
            .thumbnailer(&paths, font.as_deref())
            .ensure_all(&segments)
            .await)
    }
}
