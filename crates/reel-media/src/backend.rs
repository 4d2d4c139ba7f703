//! Media backend abstraction.
//!
//! The engine describes work as clip graphs and hands them to a
//! [`MediaBackend`]. [`FfmpegBackend`] compiles graphs into FFmpeg
//! filtergraphs and runs the CLI.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use reel_models::EncodingConfig;

use crate::audio::AudioMix;
use crate::clip::Clip;
use crate::command::{FfmpegCommand, FfmpegInput, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::graph;
use crate::probe::{self, MediaInfo};

/// One encode: a clip graph, optional audio, and where to write it.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub clip: &'a Clip,
    pub audio: Option<&'a AudioMix>,
    pub output: &'a Path,
    pub encoding: &'a EncodingConfig,
}

impl<'a> EncodeRequest<'a> {
    /// Video-only encode.
    pub fn video(clip: &'a Clip, output: &'a Path, encoding: &'a EncodingConfig) -> Self {
        Self {
            clip,
            audio: None,
            output,
            encoding,
        }
    }

    pub fn with_audio(mut self, audio: &'a AudioMix) -> Self {
        if !audio.is_empty() {
            self.audio = Some(audio);
        }
        self
    }
}

/// Operations the engine needs from a media toolkit.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Read duration, frame size and stream layout of a file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;

    /// Render a clip graph to a file.
    async fn encode(&self, request: EncodeRequest<'_>) -> MediaResult<()>;

    /// Capture one frame at `at` seconds, scaled to fit a `max_side` box.
    async fn capture_frame(
        &self,
        source: &Path,
        at: f64,
        max_side: u32,
        output: &Path,
    ) -> MediaResult<()>;
}

/// FFmpeg CLI backend.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    timeout_secs: Option<u64>,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill encoder runs that exceed `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        match self.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        }
    }

    /// Build the FFmpeg command for an encode request.
    pub fn build_encode_command(request: &EncodeRequest<'_>) -> MediaResult<FfmpegCommand> {
        let compiled = graph::compile(request.clip, request.audio, request.encoding.fps)?;

        let mut cmd = FfmpegCommand::new(request.output);
        for input in compiled.inputs {
            cmd = cmd.input(input);
        }
        cmd = cmd
            .filter_complex(compiled.filter_complex)
            .map(format!("[{}]", compiled.video_label))
            .output_args(request.encoding.video_args());

        cmd = match compiled.audio_label {
            Some(label) => cmd
                .map(format!("[{}]", label))
                .output_args(request.encoding.audio_args()),
            None => cmd.no_audio(),
        };

        Ok(cmd
            .output_duration(compiled.duration)
            .output_args(["-movflags", "+faststart"]))
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe::probe_media(path).await
    }

    async fn encode(&self, request: EncodeRequest<'_>) -> MediaResult<()> {
        let cmd = Self::build_encode_command(&request)?;
        debug!(output = %request.output.display(), "Encoding clip graph");
        self.runner().run(&cmd).await?;

        match tokio::fs::metadata(request.output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(MediaError::ffmpeg_failed(
                format!("no output written to {}", request.output.display()),
                None,
                None,
            )),
        }
    }

    async fn capture_frame(
        &self,
        source: &Path,
        at: f64,
        max_side: u32,
        output: &Path,
    ) -> MediaResult<()> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }
        let cmd = FfmpegCommand::new(output)
            .input(FfmpegInput::new(source).seek(at.max(0.0)))
            .single_frame()
            .video_filter(filters::fit_box(max_side))
            .output_args(["-q:v", "3"]);
        self.runner().run(&cmd).await
    }
}

/// In-memory backend for tests.
#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn fake_header(width: u32, height: u32, duration: f64) -> String {
        format!("fake-video {}x{} {:.3}s\n", width, height, duration)
    }

    fn parse_fake_header(body: &str) -> Option<MediaInfo> {
        let mut parts = body.lines().next()?.split_whitespace();
        if parts.next()? != "fake-video" {
            return None;
        }
        let (w, h) = parts.next()?.split_once('x')?;
        let duration = parts.next()?.strip_suffix('s')?.parse().ok()?;
        Some(MediaInfo::video(w.parse().ok()?, h.parse().ok()?, duration))
    }

    /// Write a file the fake backend probes as a video of the given shape.
    pub fn write_fake_video(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        duration: f64,
    ) -> std::io::Result<()> {
        std::fs::write(path, fake_header(width, height, duration))
    }

    /// What the fake saw for one encode.
    #[derive(Debug, Clone)]
    pub struct EncodeRecord {
        pub output: PathBuf,
        pub inputs: Vec<PathBuf>,
        pub filter_complex: String,
        pub has_audio: bool,
        pub duration: f64,
        pub width: u32,
        pub height: u32,
        /// Decoder handles open in the clip tree when encode was called
        pub open_handles: usize,
    }

    #[derive(Debug, Default)]
    struct FakeState {
        media: HashMap<PathBuf, MediaInfo>,
        failing_probes: HashSet<PathBuf>,
        failing_encodes: Vec<String>,
        encodes: Vec<EncodeRecord>,
        captures: Vec<(PathBuf, f64)>,
    }

    /// Backend that never runs FFmpeg.
    ///
    /// Probes answer from registered [`MediaInfo`] or from the header of a
    /// placeholder file; encodes compile the graph, record it and write a
    /// placeholder whose probe reports the encoded duration and size.
    #[derive(Debug, Default)]
    pub struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register media info for a path.
        pub fn add_media(&self, path: impl Into<PathBuf>, info: MediaInfo) {
            if let Ok(mut state) = self.state.lock() {
                state.media.insert(path.into(), info);
            }
        }

        /// Make probes of `path` fail.
        pub fn fail_probe(&self, path: impl Into<PathBuf>) {
            if let Ok(mut state) = self.state.lock() {
                state.failing_probes.insert(path.into());
            }
        }

        /// Make encodes fail when any input or the output path contains `needle`.
        pub fn fail_encode_matching(&self, needle: impl Into<String>) {
            if let Ok(mut state) = self.state.lock() {
                state.failing_encodes.push(needle.into());
            }
        }

        pub fn encodes(&self) -> Vec<EncodeRecord> {
            self.state
                .lock()
                .map(|s| s.encodes.clone())
                .unwrap_or_default()
        }

        pub fn captures(&self) -> Vec<(PathBuf, f64)> {
            self.state
                .lock()
                .map(|s| s.captures.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
            {
                let state = self
                    .state
                    .lock()
                    .map_err(|_| MediaError::invalid_graph("fake state poisoned"))?;
                if state.failing_probes.contains(path) {
                    return Err(MediaError::InvalidVideo(format!(
                        "cannot decode {}",
                        path.display()
                    )));
                }
                if let Some(info) = state.media.get(path) {
                    return Ok(info.clone());
                }
            }
            // copies and renames of fake outputs keep their header
            match tokio::fs::read_to_string(path).await {
                Ok(body) => parse_fake_header(&body).ok_or_else(|| {
                    MediaError::InvalidVideo(format!("cannot decode {}", path.display()))
                }),
                Err(_) => Err(MediaError::FileNotFound(path.to_path_buf())),
            }
        }

        async fn encode(&self, request: EncodeRequest<'_>) -> MediaResult<()> {
            let compiled = graph::compile(request.clip, request.audio, request.encoding.fps)?;
            let inputs = compiled.input_paths();
            let output = request.output.to_path_buf();

            {
                let state = self
                    .state
                    .lock()
                    .map_err(|_| MediaError::invalid_graph("fake state poisoned"))?;
                let out_str = output.to_string_lossy();
                let hit = state.failing_encodes.iter().any(|needle| {
                    out_str.contains(needle.as_str())
                        || inputs.iter().any(|p| p.to_string_lossy().contains(needle.as_str()))
                });
                if hit {
                    return Err(MediaError::ffmpeg_failed(
                        "injected encode failure",
                        None,
                        Some(1),
                    ));
                }
            }

            let body = format!(
                "{}{}\n",
                fake_header(request.clip.width(), request.clip.height(), compiled.duration),
                compiled.filter_complex
            );
            tokio::fs::write(&output, body).await?;

            let mut state = self
                .state
                .lock()
                .map_err(|_| MediaError::invalid_graph("fake state poisoned"))?;
            state.media.insert(
                output.clone(),
                MediaInfo {
                    has_audio: compiled.audio_label.is_some(),
                    ..MediaInfo::video(
                        request.clip.width(),
                        request.clip.height(),
                        compiled.duration,
                    )
                },
            );
            state.encodes.push(EncodeRecord {
                output,
                inputs,
                filter_complex: compiled.filter_complex,
                has_audio: compiled.audio_label.is_some(),
                duration: compiled.duration,
                width: request.clip.width(),
                height: request.clip.height(),
                open_handles: request.clip.open_handles()
                    + request.audio.map(|a| a.tracks().len()).unwrap_or(0),
            });
            Ok(())
        }

        async fn capture_frame(
            &self,
            source: &Path,
            at: f64,
            _max_side: u32,
            output: &Path,
        ) -> MediaResult<()> {
            {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|_| MediaError::invalid_graph("fake state poisoned"))?;
                if !state.media.contains_key(source) && !source.exists() {
                    return Err(MediaError::FileNotFound(source.to_path_buf()));
                }
                state.captures.push((source.to_path_buf(), at));
            }
            tokio::fs::write(output, b"fake-jpeg").await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaper::HandleRegistry;

    #[test]
    fn test_encode_command_video_only() {
        let registry = HandleRegistry::new();
        let clip = Clip::source(&registry, "/m/a.mp4", &MediaInfo::video(1080, 1920, 4.0));
        let encoding = EncodingConfig::default();
        let request = EncodeRequest::video(&clip, Path::new("/t/out.mp4"), &encoding);
        let args = FfmpegBackend::build_encode_command(&request)
            .unwrap()
            .build_args();

        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        let t = args.iter().rposition(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "4.000");
        assert_eq!(args.last().unwrap(), "/t/out.mp4");
    }

    #[test]
    fn test_encode_command_with_audio_maps_mix() {
        let registry = HandleRegistry::new();
        let clip = Clip::source(&registry, "/m/a.mp4", &MediaInfo::video(1080, 1920, 4.0));
        let mut mix = AudioMix::new();
        mix.push(crate::audio::AudioTrack::open(&registry, "/a/voice.mp3").with_volume(1.0));
        let encoding = EncodingConfig::default();
        let request =
            EncodeRequest::video(&clip, Path::new("/t/final.mp4"), &encoding).with_audio(&mix);
        let args = FfmpegBackend::build_encode_command(&request)
            .unwrap()
            .build_args();

        assert!(args.contains(&"-c:a".to_string()));
        assert!(!args.contains(&"-an".to_string()));
        let maps: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-map")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(maps.len(), 2);
    }

    #[tokio::test]
    async fn test_fake_backend_records_and_probes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = testing::FakeBackend::new();
        let registry = HandleRegistry::new();
        let clip = Clip::color("black", 640, 360, 2.0);
        let out = dir.path().join("o.mp4");
        let encoding = EncodingConfig::default();

        backend
            .encode(EncodeRequest::video(&clip, &out, &encoding))
            .await
            .unwrap();
        let info = backend.probe(&out).await.unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(backend.encodes().len(), 1);
        assert_eq!(registry.open_count(), 0);

        let copy = dir.path().join("copy.mp4");
        std::fs::copy(&out, &copy).unwrap();
        assert_eq!(backend.probe(&copy).await.unwrap().duration, 2.0);
    }

    #[tokio::test]
    async fn test_fake_backend_rejects_unknown_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let junk = dir.path().join("junk.mp4");
        std::fs::write(&junk, b"garbage").unwrap();
        let backend = testing::FakeBackend::new();
        assert!(matches!(
            backend.probe(&junk).await,
            Err(MediaError::InvalidVideo(_))
        ));
        assert!(matches!(
            backend.probe(&dir.path().join("missing.mp4")).await,
            Err(MediaError::FileNotFound(_))
        ));
    }
}
