//! Clip graph.
//!
//! A [`Clip`] describes video as a tree: source subranges, solid colour
//! backgrounds, composites of positioned layers and concatenations, each
//! node carrying its own filter chain. Clips backed by a decoder hold a
//! [`HandleGuard`]; [`Release`] tears the whole tree down.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};
use crate::filters::{self, DrawTextStyle};
use crate::probe::MediaInfo;
use crate::reaper::{HandleGuard, HandleRegistry, Release, ReleaseReport, ScratchFile};

/// A decoded source file and the range read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    /// In-point (seconds)
    pub start: f64,
    /// Length read from `start` (seconds)
    pub span: f64,
    /// Still image looped for `span`
    pub still: bool,
}

/// A positioned layer of a composite.
#[derive(Debug)]
pub enum Layer {
    Video {
        clip: Clip,
        x: String,
        y: String,
        enable: Option<(f64, f64)>,
    },
    Text {
        text_file: ScratchFile,
        style: DrawTextStyle,
        x: String,
        y: String,
        enable: Option<(f64, f64)>,
    },
}

impl Layer {
    /// Video layer at pixel position `(x, y)`.
    pub fn at(clip: Clip, x: i64, y: i64) -> Self {
        Layer::Video {
            clip,
            x: x.to_string(),
            y: y.to_string(),
            enable: None,
        }
    }

    /// Video layer with position expressions (may reference `t`, `W`, `H`).
    pub fn animated(clip: Clip, x: impl Into<String>, y: impl Into<String>) -> Self {
        Layer::Video {
            clip,
            x: x.into(),
            y: y.into(),
            enable: None,
        }
    }

    /// Text layer drawn from an owned text file, active over `window`.
    pub fn text(
        text_file: ScratchFile,
        style: DrawTextStyle,
        x: impl Into<String>,
        y: impl Into<String>,
        window: (f64, f64),
    ) -> Self {
        Layer::Text {
            text_file,
            style,
            x: x.into(),
            y: y.into(),
            enable: Some(window),
        }
    }
}

/// Node kinds of the clip graph.
#[derive(Debug)]
pub enum ClipKind {
    Source(SourceSpec),
    Color { color: String },
    Composite { layers: Vec<Layer> },
    Concat { parts: Vec<Clip> },
}

/// One node of the clip graph.
#[derive(Debug)]
pub struct Clip {
    kind: ClipKind,
    width: u32,
    height: u32,
    duration: f64,
    filters: Vec<String>,
    handle: Option<HandleGuard>,
    released: bool,
}

impl Clip {
    /// Open a source file as a clip covering its whole duration.
    pub fn source(registry: &HandleRegistry, path: impl AsRef<Path>, info: &MediaInfo) -> Self {
        let path = path.as_ref();
        let handle = registry.open(path);
        Self {
            kind: ClipKind::Source(SourceSpec {
                path: path.to_path_buf(),
                start: 0.0,
                span: info.duration,
                still: info.is_image,
            }),
            width: info.width,
            height: info.height,
            duration: info.duration,
            filters: Vec::new(),
            handle: Some(handle),
            released: false,
        }
    }

    /// Solid colour clip.
    pub fn color(color: impl Into<String>, width: u32, height: u32, duration: f64) -> Self {
        Self {
            kind: ClipKind::Color {
                color: color.into(),
            },
            width,
            height,
            duration,
            filters: Vec::new(),
            handle: None,
            released: false,
        }
    }

    /// Layers stacked bottom to top; the first layer sets the canvas.
    pub fn composite(width: u32, height: u32, duration: f64, layers: Vec<Layer>) -> Self {
        Self {
            kind: ClipKind::Composite { layers },
            width,
            height,
            duration,
            filters: Vec::new(),
            handle: None,
            released: false,
        }
    }

    /// Play `parts` back to back.
    pub fn concat(parts: Vec<Clip>) -> MediaResult<Self> {
        let first = parts
            .first()
            .ok_or_else(|| MediaError::invalid_graph("concat needs at least one part"))?;
        let (width, height) = (first.width, first.height);
        let duration = parts.iter().map(|p| p.duration).sum();
        Ok(Self {
            kind: ClipKind::Concat { parts },
            width,
            height,
            duration,
            filters: Vec::new(),
            handle: None,
            released: false,
        })
    }

    /// Restrict a source clip to `[start, end)`.
    pub fn subclip(mut self, start: f64, end: f64) -> MediaResult<Self> {
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || end <= start {
            return Err(MediaError::InvalidVideo(format!(
                "invalid subrange [{start}, {end})"
            )));
        }
        let available = self.duration;
        let spec = match &mut self.kind {
            ClipKind::Source(spec) => spec,
            _ => return Err(MediaError::invalid_graph("subclip on a non-source clip")),
        };
        let end = if spec.still {
            end
        } else {
            if start >= available {
                return Err(MediaError::InvalidVideo(format!(
                    "{}: start {start} is past the end ({available})",
                    spec.path.display()
                )));
            }
            end.min(available)
        };
        spec.start += start;
        spec.span = end - start;
        self.duration = end - start;
        Ok(self)
    }

    /// Append a raw filter to this node's chain.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Uniform time-scale; duration becomes `duration / factor`.
    pub fn with_speed(mut self, factor: f64) -> Self {
        if factor > 0.0 && (factor - 1.0).abs() > f64::EPSILON {
            self.filters.push(filters::speed(factor));
            self.duration /= factor;
        }
        self
    }

    /// Slow centred zoom-in of `rate` per second; the frame size is kept.
    pub fn zoomed(mut self, rate: f64) -> Self {
        if rate > 0.0 {
            let (width, height) = (filters::even(self.width), filters::even(self.height));
            self.filters.push(filters::zoom_in(width, height, rate));
            self.width = width;
            self.height = height;
        }
        self
    }

    /// Scale to exactly `width` x `height`.
    pub fn resized(mut self, width: u32, height: u32) -> Self {
        let (width, height) = (filters::even(width), filters::even(height));
        self.filters.push(filters::scale(width, height));
        self.width = width;
        self.height = height;
        self
    }

    /// Crop a `width` x `height` window at `(x, y)`.
    pub fn cropped(mut self, width: u32, height: u32, x: u32, y: u32) -> Self {
        self.filters.push(filters::crop(width, height, x, y));
        self.width = width;
        self.height = height;
        self
    }

    /// Keep only the head `[0, duration)`.
    pub fn trimmed(mut self, duration: f64) -> Self {
        if duration < self.duration {
            self.filters.push(filters::trim_head(duration));
            self.duration = duration;
        }
        self
    }

    pub fn kind(&self) -> &ClipKind {
        &self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Source spec of a source clip.
    pub fn source_spec(&self) -> Option<&SourceSpec> {
        match &self.kind {
            ClipKind::Source(spec) => Some(spec),
            _ => None,
        }
    }

    /// Handles still open in this tree.
    pub fn open_handles(&self) -> usize {
        let own = self
            .handle
            .as_ref()
            .map(|h| usize::from(!h.is_closed()))
            .unwrap_or(0);
        own + self.children().map(Clip::open_handles).sum::<usize>()
    }

    /// Number of source leaves in this tree.
    pub fn source_count(&self) -> usize {
        match &self.kind {
            ClipKind::Source(_) => 1,
            _ => self.children().map(Clip::source_count).sum(),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = &Clip> + '_> {
        match &self.kind {
            ClipKind::Composite { layers } => Box::new(layers.iter().filter_map(|l| match l {
                Layer::Video { clip, .. } => Some(clip),
                Layer::Text { .. } => None,
            })),
            ClipKind::Concat { parts } => Box::new(parts.iter()),
            _ => Box::new(std::iter::empty()),
        }
    }
}

impl Release for Clip {
    fn release(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        match &mut self.kind {
            ClipKind::Composite { layers } => {
                for layer in layers.iter_mut() {
                    match layer {
                        Layer::Video { clip, .. } => report.merge(clip.release()),
                        Layer::Text { text_file, .. } => {
                            if text_file.remove() {
                                report.files_removed += 1;
                            }
                        }
                    }
                }
            }
            ClipKind::Concat { parts } => {
                for part in parts.iter_mut() {
                    report.merge(part.release());
                }
            }
            ClipKind::Source(_) | ClipKind::Color { .. } => {}
        }

        if let Some(handle) = self.handle.as_mut() {
            if handle.close() {
                report.handles_closed += 1;
            }
        }
        report
    }
}

impl Drop for Clip {
    fn drop(&mut self) {
        self.release();
    }
}
