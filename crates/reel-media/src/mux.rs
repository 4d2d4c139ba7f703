//! Final mux: narration, background music and subtitles over the combined
//! video.

use rand::prelude::IndexedRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use reel_models::{BgmType, EncodingConfig, RenderParams, SubtitlePosition};

use crate::audio::{AudioMix, AudioTrack, DUCKING_FACTOR};
use crate::backend::{EncodeRequest, MediaBackend};
use crate::clip::{Clip, Layer};
use crate::error::{EngineError, EngineResult};
use crate::filters::DrawTextStyle;
use crate::reaper::{HandleRegistry, Release, ScratchFile};
use crate::subtitles::{self, SubtitleItem};
use crate::text_wrap::{wrap_text, ApproxMeasure, FontMetrics, TextMeasure};

/// Share of the frame width subtitles may occupy.
const SUBTITLE_WIDTH_RATIO: f64 = 0.9;

/// Margin kept around custom-positioned subtitles (pixels).
const CUSTOM_MARGIN: f64 = 10.0;

/// Inputs of one mux.
#[derive(Debug, Clone, Copy)]
pub struct MuxRequest<'a> {
    pub combined: &'a Path,
    pub narration: Option<&'a Path>,
    pub subtitles: Option<&'a Path>,
    pub params: &'a RenderParams,
    pub output: &'a Path,
}

/// What went into a finished mux.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxOutcome {
    pub output: PathBuf,
    pub subtitle_count: usize,
    pub music: Option<PathBuf>,
}

/// Pick the background music file.
///
/// An explicit, existing `bgm_file` wins. Otherwise `bgm_type=random` picks
/// uniformly among `*.mp3` files in `music_dir`.
pub fn resolve_bgm<R: Rng + ?Sized>(
    params: &RenderParams,
    music_dir: Option<&Path>,
    rng: &mut R,
) -> Option<PathBuf> {
    if let Some(file) = params.explicit_bgm_file() {
        let path = PathBuf::from(file);
        if path.is_file() {
            return Some(path);
        }
        warn!(path = %path.display(), "Background music file not found");
    }

    if params.bgm_type != BgmType::Random {
        return None;
    }
    let dir = music_dir?;
    let mut songs: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("mp3"))
                    .unwrap_or(false)
            })
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list music directory");
            return None;
        }
    };
    songs.sort();
    songs.choose(rng).cloned()
}

/// Gain applied to background music for these params.
pub fn effective_music_gain(params: &RenderParams) -> f64 {
    let ducking = if params.bgm_ducking { DUCKING_FACTOR } else { 1.0 };
    params.bgm_volume * ducking
}

/// Build the background music track for a video of `duration` seconds.
pub fn music_track(
    registry: &HandleRegistry,
    path: &Path,
    params: &RenderParams,
    duration: f64,
) -> AudioTrack {
    let mut track = AudioTrack::open(registry, path)
        .with_volume(params.bgm_volume)
        .with_fade_in(params.bgm_fade_in_sec)
        .with_fade_out(duration, params.bgm_fade_out_sec)
        .looped();
    if params.bgm_ducking {
        track = track.with_volume(DUCKING_FACTOR);
    }
    track
}

/// Top edge of a subtitle block of height `text_h` in a frame of height
/// `frame_h`.
pub fn subtitle_y(params: &RenderParams, frame_h: f64, text_h: f64) -> f64 {
    match params.subtitle_position {
        SubtitlePosition::Bottom => frame_h * 0.95 - text_h,
        SubtitlePosition::Top => frame_h * 0.05,
        SubtitlePosition::Center => (frame_h - text_h) / 2.0,
        SubtitlePosition::Custom => {
            let max_y = frame_h - text_h - CUSTOM_MARGIN;
            let y = (frame_h - text_h) * (params.custom_position / 100.0);
            y.min(max_y).max(CUSTOM_MARGIN)
        }
    }
}

/// Font file for subtitles: an absolute `font_name`, or one inside `font_dir`.
pub fn resolve_font(params: &RenderParams, font_dir: Option<&Path>) -> Option<PathBuf> {
    let name = Path::new(params.font_name.trim());
    if name.as_os_str().is_empty() {
        return None;
    }
    let path = if name.is_absolute() {
        name.to_path_buf()
    } else {
        font_dir?.join(name)
    };
    path.is_file().then_some(path)
}

fn text_style(params: &RenderParams, font: Option<&Path>) -> DrawTextStyle {
    DrawTextStyle {
        font_file: font.map(|p| p.to_string_lossy().into_owned()),
        font_size: params.font_size,
        color: params.text_fore_color.clone(),
        box_color: params.text_background_color.box_color().map(str::to_string),
        stroke_color: Some(params.stroke_color.clone()),
        stroke_width: params.stroke_width.max(0.0).round() as u32,
        line_spacing: (params.font_size as f64 * 0.25) as u32,
    }
}

/// Runs the mux against a backend.
pub struct Muxer<'a> {
    backend: &'a dyn MediaBackend,
    registry: &'a HandleRegistry,
    encoding: &'a EncodingConfig,
    music_dir: Option<&'a Path>,
    font_dir: Option<&'a Path>,
}

impl<'a> Muxer<'a> {
    pub fn new(
        backend: &'a dyn MediaBackend,
        registry: &'a HandleRegistry,
        encoding: &'a EncodingConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            encoding,
            music_dir: None,
            font_dir: None,
        }
    }

    pub fn with_music_dir(mut self, dir: Option<&'a Path>) -> Self {
        self.music_dir = dir;
        self
    }

    pub fn with_font_dir(mut self, dir: Option<&'a Path>) -> Self {
        self.font_dir = dir;
        self
    }

    /// Mux `request.combined` into `request.output`.
    pub async fn mux<R: Rng + Send>(
        &self,
        request: MuxRequest<'_>,
        rng: &mut R,
    ) -> EngineResult<MuxOutcome> {
        let combined_ok = tokio::fs::metadata(request.combined)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !combined_ok {
            return Err(EngineError::invalid_input(format!(
                "invalid input video for rendering: {}",
                request.combined.display()
            )));
        }
        if let Some(narration) = request.narration {
            if !narration.is_file() {
                return Err(EngineError::invalid_input(format!(
                    "narration not found: {}",
                    narration.display()
                )));
            }
        }

        let params = request.params;
        let info = self.backend.probe(request.combined).await?;
        let (width, height) = (info.width, info.height);
        let duration = info.duration;
        info!(
            combined = %request.combined.display(),
            output = %request.output.display(),
            width,
            height,
            "Muxing final video"
        );

        let video = Clip::source(self.registry, request.combined, &info);
        let mut layers = vec![Layer::at(video, 0, 0)];

        let items = match (params.subtitle_enabled, request.subtitles) {
            (true, Some(path)) if path.exists() => {
                let items = subtitles::read_srt(path).await?;
                subtitles::shift_items(items, params.subtitle_offset)
            }
            _ => Vec::new(),
        };
        let subtitle_count = items.len();
        if !items.is_empty() {
            let text_layers = self
                .subtitle_layers(&items, params, request.output, width, height)
                .await?;
            layers.extend(text_layers);
        }

        let mut clip = Clip::composite(width, height, duration, layers);

        let mut mix = AudioMix::new();
        if let Some(narration) = request.narration {
            mix.push(AudioTrack::open(self.registry, narration).with_volume(params.voice_volume));
        }

        let music = resolve_bgm(params, self.music_dir, rng);
        let music = match music {
            Some(path) => match self.backend.probe(&path).await {
                Ok(_) => {
                    mix.push(music_track(self.registry, &path, params, duration));
                    Some(path)
                }
                Err(e) => {
                    warn!(path = %path.display(), stage = "bgm", error = %e, "Failed to add background music");
                    None
                }
            },
            None => None,
        };

        let encoding = self.encoding.clone().with_threads(params.n_threads);
        let result = self
            .backend
            .encode(EncodeRequest::video(&clip, request.output, &encoding).with_audio(&mix))
            .await;

        let report = {
            let mut report = clip.release();
            report.merge(mix.release());
            report
        };
        debug!(
            handles = report.handles_closed,
            files = report.files_removed,
            "Released mux inputs"
        );
        result?;

        Ok(MuxOutcome {
            output: request.output.to_path_buf(),
            subtitle_count,
            music,
        })
    }

    async fn subtitle_layers(
        &self,
        items: &[SubtitleItem],
        params: &RenderParams,
        output: &Path,
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<Layer>> {
        let font = resolve_font(params, self.font_dir);
        let max_width = (width as f64 * SUBTITLE_WIDTH_RATIO) as f32;
        let placed: Vec<(String, f64)> = {
            let measure: Box<dyn TextMeasure> = match font
                .as_deref()
                .map(|path| FontMetrics::load(path, params.font_size as f32))
            {
                Some(Ok(metrics)) => Box::new(metrics),
                Some(Err(e)) => {
                    warn!(error = %e, "Falling back to estimated text metrics");
                    Box::new(ApproxMeasure {
                        px: params.font_size as f32,
                    })
                }
                None => {
                    warn!(font = %params.font_name, "Subtitle font not found, using default font");
                    Box::new(ApproxMeasure {
                        px: params.font_size as f32,
                    })
                }
            };
            items
                .iter()
                .map(|item| {
                    let wrapped = wrap_text(&item.text, max_width, measure.as_ref());
                    let y = subtitle_y(params, height as f64, wrapped.height as f64);
                    (wrapped.text, y)
                })
                .collect()
        };

        let style = text_style(params, font.as_deref());
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());

        let mut layers = Vec::with_capacity(items.len());
        for (i, (item, (text, y))) in items.iter().zip(placed).enumerate() {
            let text_path = dir.join(format!("{}-sub-{:04}.txt", stem, i + 1));
            tokio::fs::write(&text_path, text.as_bytes()).await?;
            layers.push(Layer::text(
                ScratchFile::new(text_path),
                style.clone(),
                "(w-text_w)/2",
                format!("{}", y.round() as i64),
                (item.start, item.end),
            ));
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::probe::MediaInfo;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_ducking_lowers_music_gain() {
        let plain = RenderParams::default();
        let ducked = RenderParams {
            bgm_ducking: true,
            ..RenderParams::default()
        };
        assert!(effective_music_gain(&ducked) < effective_music_gain(&plain));

        let registry = HandleRegistry::new();
        let a = music_track(&registry, Path::new("/m/a.mp3"), &plain, 30.0);
        let b = music_track(&registry, Path::new("/m/a.mp3"), &ducked, 30.0);
        assert!(b.gain() < a.gain());
        assert!((b.gain() - effective_music_gain(&ducked)).abs() < 1e-9);
    }

    #[test]
    fn test_subtitle_positions() {
        let mut params = RenderParams::default();
        assert!((subtitle_y(&params, 1920.0, 100.0) - 1724.0).abs() < 1e-9);
        params.subtitle_position = SubtitlePosition::Top;
        assert!((subtitle_y(&params, 1920.0, 100.0) - 96.0).abs() < 1e-9);
        params.subtitle_position = SubtitlePosition::Center;
        assert_eq!(subtitle_y(&params, 1920.0, 100.0), 910.0);
        params.subtitle_position = SubtitlePosition::Custom;
        params.custom_position = 100.0;
        assert_eq!(subtitle_y(&params, 1920.0, 100.0), 1810.0);
        params.custom_position = 0.0;
        assert_eq!(subtitle_y(&params, 1920.0, 100.0), 10.0);
    }

    #[test]
    fn test_resolve_bgm_explicit_and_random() {
        let dir = TempDir::new().unwrap();
        let song = dir.path().join("song.mp3");
        std::fs::write(&song, b"id3").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let params = RenderParams::default();
        assert_eq!(resolve_bgm(&params, Some(dir.path()), &mut rng), Some(song.clone()));

        let explicit = RenderParams {
            bgm_type: BgmType::None,
            bgm_file: Some(song.to_string_lossy().into_owned()),
            ..RenderParams::default()
        };
        assert_eq!(resolve_bgm(&explicit, None, &mut rng), Some(song));

        let none = RenderParams {
            bgm_type: BgmType::None,
            ..RenderParams::default()
        };
        assert_eq!(resolve_bgm(&none, Some(dir.path()), &mut rng), None);
    }

    #[tokio::test]
    async fn test_mux_rejects_empty_combined() {
        let dir = TempDir::new().unwrap();
        let combined = dir.path().join("combined-1.mp4");
        std::fs::write(&combined, b"").unwrap();
        let backend = FakeBackend::new();
        let registry = HandleRegistry::new();
        let encoding = EncodingConfig::default();
        let params = RenderParams::default();
        let out = dir.path().join("final-1.mp4");

        let err = Muxer::new(&backend, &registry, &encoding)
            .mux(
                MuxRequest {
                    combined: &combined,
                    narration: None,
                    subtitles: None,
                    params: &params,
                    output: &out,
                },
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_mux_shifted_subtitle_window() {
        let dir = TempDir::new().unwrap();
        let combined = dir.path().join("combined-1.mp4");
        let narration = dir.path().join("audio.mp3");
        let srt = dir.path().join("subtitle.srt");
        std::fs::write(&combined, b"video").unwrap();
        std::fs::write(&narration, b"audio").unwrap();
        std::fs::write(&srt, "1\n00:00:02,000 --> 00:00:04,000\nhello\n").unwrap();

        let backend = FakeBackend::new();
        backend.add_media(&combined, MediaInfo::video(1080, 1920, 6.0));
        let registry = HandleRegistry::new();
        let encoding = EncodingConfig::default();
        let params = RenderParams {
            subtitle_offset: -1.0,
            bgm_type: BgmType::None,
            ..RenderParams::default()
        };
        let out = dir.path().join("final-1.mp4");

        let outcome = Muxer::new(&backend, &registry, &encoding)
            .mux(
                MuxRequest {
                    combined: &combined,
                    narration: Some(&narration),
                    subtitles: Some(&srt),
                    params: &params,
                    output: &out,
                },
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap();

        assert_eq!(outcome.subtitle_count, 1);
        assert_eq!(outcome.music, None);
        let encodes = backend.encodes();
        assert_eq!(encodes.len(), 1);
        assert!(encodes[0].filter_complex.contains("enable='between(t,1,3)'"));
        assert!(encodes[0].has_audio);
        // subtitle text files and handles are gone after the mux
        assert!(!dir.path().join("final-1-sub-0001.txt").exists());
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_music_is_skipped() {
        let dir = TempDir::new().unwrap();
        let combined = dir.path().join("combined-1.mp4");
        let narration = dir.path().join("audio.mp3");
        let song = dir.path().join("broken.mp3");
        std::fs::write(&combined, b"video").unwrap();
        std::fs::write(&narration, b"audio").unwrap();
        std::fs::write(&song, b"not audio").unwrap();

        let backend = FakeBackend::new();
        backend.add_media(&combined, MediaInfo::video(1080, 1920, 4.0));
        backend.fail_probe(&song);
        let registry = HandleRegistry::new();
        let encoding = EncodingConfig::default();
        let params = RenderParams {
            bgm_file: Some(song.to_string_lossy().into_owned()),
            ..RenderParams::default()
        };
        let out = dir.path().join("final-1.mp4");

        let outcome = Muxer::new(&backend, &registry, &encoding)
            .mux(
                MuxRequest {
                    combined: &combined,
                    narration: Some(&narration),
                    subtitles: None,
                    params: &params,
                    output: &out,
                },
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap();
        assert_eq!(outcome.music, None);
        assert_eq!(backend.encodes()[0].inputs.len(), 2);
    }
}
