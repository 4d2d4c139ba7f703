//! Segment thumbnails.
//!
//! Best effort: a frame from the segment's material, else a frame from a
//! rendered output at the segment's timeline offset, else a generated
//! placeholder.

use image::{Rgb, RgbImage};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use reel_models::SegmentDescriptor;

use crate::backend::MediaBackend;
use crate::error::{EngineError, EngineResult, MediaError, MediaResult};
use crate::layout::TaskPaths;
use crate::probe::is_image_path;
use crate::text_wrap::{FontMetrics, TextMeasure};

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 360;
pub const PLACEHOLDER_TEXT: &str = "No Material";
const PLACEHOLDER_BACKGROUND: Rgb<u8> = Rgb([240, 240, 240]);
const PLACEHOLDER_INK: u8 = 128;
const PLACEHOLDER_FONT_PX: f32 = 28.0;
const JPEG_QUALITY: u8 = 80;

/// Capture time inside a segment: its middle, kept 50ms off either edge.
pub fn capture_time(start: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        start + (duration * 0.5).min(duration - 0.05).max(0.05)
    } else {
        start + 0.2
    }
}

/// Start of `segment_id` on the output timeline (sum of the declared
/// durations before it).
pub fn timeline_offset(segments: &[SegmentDescriptor], segment_id: &str) -> f64 {
    segments
        .iter()
        .take_while(|s| s.segment_id != segment_id)
        .map(|s| s.duration.max(0.0))
        .sum()
}

/// Inputs for thumbnail generation of one task.
pub struct Thumbnailer<'a> {
    pub backend: &'a dyn MediaBackend,
    pub paths: &'a TaskPaths,
    pub max_side: u32,
    /// Font for the placeholder caption
    pub font: Option<&'a Path>,
}

impl Thumbnailer<'_> {
    /// Thumbnail for `segment_id` within `segments`.
    pub async fn get_or_create(
        &self,
        segments: &[SegmentDescriptor],
        segment_id: &str,
    ) -> EngineResult<PathBuf> {
        let segment = segments
            .iter()
            .find(|s| s.segment_id == segment_id)
            .ok_or_else(|| EngineError::SegmentNotFound(segment_id.to_string()))?;

        let material = Path::new(&segment.material);
        let thumb = self.paths.thumbnail(segment_id);
        tokio::fs::create_dir_all(self.paths.thumbs_dir()).await?;

        if material.is_file() {
            if is_image_path(material) {
                return Ok(material.to_path_buf());
            }
            if thumb.is_file() {
                return Ok(thumb);
            }
            let at = capture_time(segment.start, segment.duration);
            match self.capture(material, at, &thumb).await {
                Ok(()) => return Ok(thumb),
                Err(e) => {
                    warn!(segment_id, path = %material.display(), stage = "thumbnail", error = %e, "Frame capture failed");
                }
            }
        } else {
            let offset = timeline_offset(segments, segment_id);
            for output in self.paths.rendered_outputs().await {
                match self.capture(&output, offset + 0.05, &thumb).await {
                    Ok(()) => return Ok(thumb),
                    Err(e) => {
                        debug!(segment_id, path = %output.display(), error = %e, "Capture from output failed");
                    }
                }
            }
        }

        write_placeholder(&thumb, self.font).await?;
        Ok(thumb)
    }

    /// Thumbnails for every segment; failures are logged and skipped.
    /// Returns how many segments have one.
    pub async fn ensure_all(&self, segments: &[SegmentDescriptor]) -> usize {
        let mut ready = 0;
        for segment in segments {
            match self.get_or_create(segments, &segment.segment_id).await {
                Ok(_) => ready += 1,
                Err(e) => {
                    warn!(segment_id = %segment.segment_id, error = %e, "Thumbnail unavailable");
                }
            }
        }
        ready
    }

    /// Capture a frame, clamping `at` inside the source.
    async fn capture(&self, source: &Path, at: f64, output: &Path) -> MediaResult<()> {
        let at = match self.backend.probe(source).await {
            Ok(info) if info.duration > 0.0 => at.min(info.duration - 0.01).max(0.0),
            _ => at.max(0.0),
        };
        self.backend
            .capture_frame(source, at, self.max_side, output)
            .await
    }
}

/// Render the "No Material" placeholder JPEG.
pub async fn write_placeholder(path: &Path, font: Option<&Path>) -> MediaResult<()> {
    let path = path.to_path_buf();
    let font = font.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || render_placeholder(&path, font.as_deref()))
        .await
        .map_err(|e| MediaError::Io(std::io::Error::other(e)))?
}

fn render_placeholder(path: &Path, font: Option<&Path>) -> MediaResult<()> {
    let mut img =
        RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, PLACEHOLDER_BACKGROUND);

    match font.map(|f| FontMetrics::load(f, PLACEHOLDER_FONT_PX)) {
        Some(Ok(metrics)) => draw_centered_text(&mut img, &metrics, PLACEHOLDER_TEXT),
        Some(Err(e)) => warn!(error = %e, "Placeholder drawn without caption"),
        None => {}
    }

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(())
}

fn draw_centered_text(img: &mut RgbImage, metrics: &FontMetrics, text: &str) {
    let font = metrics.font();
    let px = metrics.px();
    let size = metrics.measure(text);
    let ascent = font
        .horizontal_line_metrics(px)
        .map(|m| m.ascent)
        .unwrap_or(px * 0.8);

    let mut pen_x = (img.width() as f32 - size.width) / 2.0;
    let baseline = (img.height() as f32 - size.height) / 2.0 + ascent;

    for c in text.chars() {
        let (glyph, coverage) = font.rasterize(c, px);
        let left = (pen_x + glyph.xmin as f32).round() as i64;
        let top = (baseline - glyph.height as f32 - glyph.ymin as f32).round() as i64;
        for row in 0..glyph.height {
            for col in 0..glyph.width {
                let alpha = coverage[row * glyph.width + col] as f32 / 255.0;
                let (x, y) = (left + col as i64, top + row as i64);
                if alpha <= 0.0 || x < 0 || y < 0 {
                    continue;
                }
                let (x, y) = (x as u32, y as u32);
                if x >= img.width() || y >= img.height() {
                    continue;
                }
                let pixel = img.get_pixel_mut(x, y);
                for channel in pixel.0.iter_mut() {
                    let bg = *channel as f32;
                    *channel = (bg + (PLACEHOLDER_INK as f32 - bg) * alpha).round() as u8;
                }
            }
        }
        pen_x += glyph.advance_width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{write_fake_video, FakeBackend};
    use crate::probe::MediaInfo;
    use reel_models::TaskId;
    use tempfile::TempDir;

    #[test]
    fn test_capture_time() {
        assert_eq!(capture_time(2.0, 4.0), 4.0);
        assert!((capture_time(0.0, 0.08) - 0.05).abs() < 1e-9);
        assert!((capture_time(1.0, 0.0) - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_timeline_offset() {
        let segs = vec![
            SegmentDescriptor::new("a", 1, "/m/a.mp4", 0.0, 3.0),
            SegmentDescriptor::new("b", 2, "/m/b.mp4", 0.0, 2.5),
            SegmentDescriptor::new("c", 3, "/m/c.mp4", 0.0, 4.0),
        ];
        assert_eq!(timeline_offset(&segs, "a"), 0.0);
        assert_eq!(timeline_offset(&segs, "c"), 5.5);
    }

    #[tokio::test]
    async fn test_placeholder_is_decodable_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.jpg");
        write_placeholder(&path, None).await.unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
    }

    async fn setup() -> (TempDir, TaskPaths, FakeBackend) {
        let dir = TempDir::new().unwrap();
        let paths = TaskPaths::new(dir.path(), &TaskId::from("t")).unwrap();
        paths.ensure_dirs().await.unwrap();
        (dir, paths, FakeBackend::new())
    }

    #[tokio::test]
    async fn test_capture_from_material_then_cache() {
        let (dir, paths, backend) = setup().await;
        let material = dir.path().join("a.mp4");
        write_fake_video(&material, 1920, 1080, 10.0).unwrap();
        let segs = vec![SegmentDescriptor::new("s1", 1, material.to_string_lossy(), 2.0, 6.0)];
        let thumbs = Thumbnailer { backend: &backend, paths: &paths, max_side: 640, font: None };

        let first = thumbs.get_or_create(&segs, "s1").await.unwrap();
        assert_eq!(first, paths.thumbnail("s1"));
        assert_eq!(backend.captures(), vec![(material.clone(), 4.0)]);

        let again = thumbs.get_or_create(&segs, "s1").await.unwrap();
        assert_eq!(again, first);
        assert_eq!(backend.captures().len(), 1);
    }

    #[tokio::test]
    async fn test_image_material_returned_directly() {
        let (dir, paths, backend) = setup().await;
        let material = dir.path().join("still.PNG");
        std::fs::write(&material, b"png").unwrap();
        let segs = vec![SegmentDescriptor::new("s1", 1, material.to_string_lossy(), 0.0, 3.0)];
        let thumbs = Thumbnailer { backend: &backend, paths: &paths, max_side: 640, font: None };
        assert_eq!(thumbs.get_or_create(&segs, "s1").await.unwrap(), material);
    }

    #[tokio::test]
    async fn test_missing_material_uses_rendered_output() {
        let (_dir, paths, backend) = setup().await;
        write_fake_video(paths.combined(1), 1080, 1920, 8.0).unwrap();
        let segs = vec![
            SegmentDescriptor::new("s1", 1, "/gone/a.mp4", 0.0, 3.0),
            SegmentDescriptor::new("s2", 2, "/gone/b.mp4", 0.0, 3.0),
        ];
        let thumbs = Thumbnailer { backend: &backend, paths: &paths, max_side: 640, font: None };

        thumbs.get_or_create(&segs, "s2").await.unwrap();
        let captures = backend.captures();
        assert_eq!(captures[0].0, paths.combined(1));
        assert!((captures[0].1 - 3.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_placeholder_when_nothing_available() {
        let (_dir, paths, backend) = setup().await;
        let segs = vec![SegmentDescriptor::new("s1", 1, "/gone/a.mp4", 0.0, 3.0)];
        let thumbs = Thumbnailer { backend: &backend, paths: &paths, max_side: 640, font: None };

        let path = thumbs.get_or_create(&segs, "s1").await.unwrap();
        assert!(image::open(&path).is_ok());
        assert!(matches!(
            thumbs.get_or_create(&segs, "nope").await,
            Err(EngineError::SegmentNotFound(_))
        ));
        assert_eq!(thumbs.ensure_all(&segs).await, 1);
    }

    #[tokio::test]
    async fn test_capture_survives_probe_failure() {
        let (dir, paths, _) = setup().await;
        let backend = FakeBackend::new();
        let material = dir.path().join("a.mp4");
        std::fs::write(&material, b"x").unwrap();
        backend.add_media(&material, MediaInfo::video(1920, 1080, 4.0));
        backend.fail_probe(&material);
        let segs = vec![SegmentDescriptor::new("s1", 1, material.to_string_lossy(), 0.0, 3.0)];
        let thumbs = Thumbnailer { backend: &backend, paths: &paths, max_side: 640, font: None };
        // probe fails but capture still runs against the existing file
        let path = thumbs.get_or_create(&segs, "s1").await.unwrap();
        assert_eq!(path, paths.thumbnail("s1"));
    }
}
