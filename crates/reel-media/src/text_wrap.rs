//! Subtitle text measurement and wrapping.

use fontdue::{Font, FontSettings};
use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Rendered size of a single line of text, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSize {
    pub width: f32,
    pub height: f32,
}

/// Measures rendered text.
pub trait TextMeasure {
    fn measure(&self, text: &str) -> TextSize;
}

/// Glyph metrics of a real font at a fixed pixel size.
pub struct FontMetrics {
    font: Font,
    px: f32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("name", &self.font.name())
            .field("px", &self.px)
            .finish()
    }
}

impl FontMetrics {
    /// Load a TrueType/OpenType font (first face of a collection).
    pub fn load(path: &Path, px: f32) -> MediaResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| MediaError::font(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_bytes(bytes, px)
            .map_err(|e| MediaError::font(format!("{}: {}", path.display(), e)))
    }

    pub fn from_bytes(bytes: Vec<u8>, px: f32) -> MediaResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(MediaError::font)?;
        Ok(Self { font, px })
    }

    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn px(&self) -> f32 {
        self.px
    }

    pub fn line_height(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.px)
            .map(|m| m.new_line_size)
            .unwrap_or(self.px * 1.2)
    }
}

impl TextMeasure for FontMetrics {
    fn measure(&self, text: &str) -> TextSize {
        let mut width = 0.0;
        let mut prev: Option<char> = None;
        for c in text.chars() {
            if let Some(p) = prev {
                width += self.font.horizontal_kern(p, c, self.px).unwrap_or(0.0);
            }
            width += self.font.metrics(c, self.px).advance_width;
            prev = Some(c);
        }
        TextSize {
            width,
            height: self.line_height(),
        }
    }
}

/// Width estimate used when no font file can be loaded.
#[derive(Debug, Clone, Copy)]
pub struct ApproxMeasure {
    pub px: f32,
}

impl TextMeasure for ApproxMeasure {
    fn measure(&self, text: &str) -> TextSize {
        let width = text
            .chars()
            .map(|c| if is_wide(c) { self.px } else { self.px * 0.55 })
            .sum();
        TextSize {
            width,
            height: self.px * 1.2,
        }
    }
}

/// East Asian wide characters render at roughly one em.
fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6)
}

/// Wrapped text and its total height.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedText {
    pub text: String,
    pub height: f32,
    pub line_count: usize,
}

/// Wrap `text` to `max_width`.
///
/// A string that fits is returned as one line. Otherwise words are packed
/// greedily; if any single word is wider than `max_width` the whole string is
/// re-wrapped character by character. Height is the line count times the
/// single-line height.
pub fn wrap_text(text: &str, max_width: f32, measure: &dyn TextMeasure) -> WrappedText {
    let whole = measure.measure(text.trim());
    let line_height = whole.height;
    if whole.width <= max_width {
        return WrappedText {
            text: text.to_string(),
            height: line_height,
            line_count: 1,
        };
    }

    let lines = wrap_words(text, max_width, measure)
        .unwrap_or_else(|| wrap_chars(text, max_width, measure));
    let line_count = lines.len().max(1);
    WrappedText {
        text: lines.join("\n"),
        height: line_count as f32 * line_height,
        line_count,
    }
}

fn fits(line: &str, max_width: f32, measure: &dyn TextMeasure) -> bool {
    measure.measure(line.trim()).width <= max_width
}

/// Greedy word packing; `None` when a single word cannot fit on a line.
fn wrap_words(text: &str, max_width: f32, measure: &dyn TextMeasure) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if fits(&candidate, max_width, measure) {
            current = candidate;
        } else if current.is_empty() {
            return None;
        } else {
            lines.push(std::mem::take(&mut current));
            if !fits(word, max_width, measure) {
                return None;
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    Some(lines)
}

fn wrap_chars(text: &str, max_width: f32, measure: &dyn TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            lines.push(std::mem::take(&mut current));
            continue;
        }
        let mut candidate = current.clone();
        candidate.push(c);
        if current.trim().is_empty() || fits(&candidate, max_width, measure) {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    lines.push(current);
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is 10px wide, lines are 20px tall.
    struct FixedAdvance;

    impl TextMeasure for FixedAdvance {
        fn measure(&self, text: &str) -> TextSize {
            TextSize {
                width: text.chars().count() as f32 * 10.0,
                height: 20.0,
            }
        }
    }

    #[test]
    fn test_fitting_text_is_one_line() {
        let wrapped = wrap_text("hello world", 200.0, &FixedAdvance);
        assert_eq!(wrapped.text, "hello world");
        assert_eq!(wrapped.line_count, 1);
        assert_eq!(wrapped.height, 20.0);
    }

    #[test]
    fn test_word_wrap() {
        let wrapped = wrap_text("the quick brown fox jumps", 100.0, &FixedAdvance);
        assert_eq!(wrapped.text, "the quick\nbrown fox\njumps");
        assert_eq!(wrapped.line_count, 3);
        assert_eq!(wrapped.height, 60.0);
    }

    #[test]
    fn test_spaceless_overwide_text_wraps_by_char() {
        let text = "字幕测试没有空格的很长的一句话";
        let wrapped = wrap_text(text, 50.0, &FixedAdvance);
        assert!(wrapped.line_count > 1);
        for line in wrapped.text.lines() {
            assert!(FixedAdvance.measure(line).width <= 50.0, "line too wide: {line}");
        }
        assert_eq!(wrapped.text.replace('\n', ""), text);
        assert_eq!(wrapped.height, wrapped.line_count as f32 * 20.0);
    }

    #[test]
    fn test_single_overwide_word_switches_to_char_wrap() {
        let wrapped = wrap_text("ok supercalifragilistic", 60.0, &FixedAdvance);
        for line in wrapped.text.lines() {
            assert!(FixedAdvance.measure(line).width <= 60.0);
        }
        assert_eq!(wrapped.text.lines().next(), Some("ok sup"));
    }

    #[test]
    fn test_approx_measure_wide_chars() {
        let m = ApproxMeasure { px: 40.0 };
        assert_eq!(m.measure("中").width, 40.0);
        assert_eq!(m.measure("a").width, 22.0);
    }

    #[test]
    fn test_missing_font_file() {
        let err = FontMetrics::load(Path::new("/nonexistent/font.ttf"), 24.0).unwrap_err();
        assert!(matches!(err, MediaError::Font(_)));
    }
}
