//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Still image extensions treated as image materials.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Media file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds (0 for still images)
    pub duration: f64,
    /// Width in pixels (0 when there is no video stream)
    pub width: u32,
    /// Height in pixels (0 when there is no video stream)
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    pub has_video: bool,
    pub has_audio: bool,
    /// Source is a still image
    pub is_image: bool,
}

impl MediaInfo {
    /// Info for a video stream of the given size and duration.
    pub fn video(width: u32, height: u32, duration: f64) -> Self {
        Self {
            duration,
            width,
            height,
            fps: 30.0,
            has_video: true,
            has_audio: false,
            is_image: false,
        }
    }

    /// Info for an audio-only file.
    pub fn audio(duration: f64) -> Self {
        Self {
            duration,
            has_audio: true,
            ..Default::default()
        }
    }

    /// Info for a still image.
    pub fn image(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            has_video: true,
            is_image: true,
            ..Default::default()
        }
    }
}

/// Whether a path names a still image by extension.
pub fn is_image_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(media_info_from_probe(&probe, is_image_path(path)))
}

fn media_info_from_probe(probe: &FfprobeOutput, is_image: bool) -> MediaInfo {
    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_deref()
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let fps = video
        .and_then(|v| v.avg_frame_rate.as_deref().or(v.r_frame_rate.as_deref()))
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    MediaInfo {
        duration: if is_image { 0.0 } else { duration },
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        has_video: video.is_some(),
        has_audio,
        is_image,
    }
}

/// Get media duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_media(path).await?;
    Ok(info.duration)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_audio_only_probe() {
        let json = r#"{
            "format": {"duration": "12.480000"},
            "streams": [{"codec_type": "audio"}]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = media_info_from_probe(&probe, false);
        assert!(!info.has_video);
        assert!(info.has_audio);
        assert!((info.duration - 12.48).abs() < 1e-9);
    }

    #[test]
    fn test_video_probe() {
        let json = r#"{
            "format": {"duration": "10.0"},
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "25/1"},
                {"codec_type": "audio"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = media_info_from_probe(&probe, false);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.fps, 25.0);
        assert!(info.has_video && info.has_audio);
    }

    #[test]
    fn test_image_extension() {
        assert!(is_image_path("/a/b/photo.JPG"));
        assert!(!is_image_path("/a/b/clip.mp4"));
        assert!(!is_image_path("/a/b/noext"));
    }
}
