//! SRT subtitle parsing and timeline shifting.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use reel_models::parse_timestamp;

use crate::error::{MediaError, MediaResult};

/// One timed subtitle cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleItem {
    /// Start time (seconds)
    pub start: f64,
    /// End time (seconds)
    pub end: f64,
    pub text: String,
}

impl SubtitleItem {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the cue is on screen at time `t`.
    pub fn is_active_at(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Parse SRT content.
///
/// Blocks are separated by blank lines; the numeric index line is optional.
/// Malformed cue lines are skipped with a warning.
pub fn parse_srt(content: &str) -> MediaResult<Vec<SubtitleItem>> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let normalized = normalized.trim_start_matches('\u{feff}');
    let mut items = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().map(str::trim_end).collect();
        let Some(cue_at) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let (start, end) = match parse_cue_line(lines[cue_at]) {
            Ok(range) => range,
            Err(e) => {
                warn!(line = lines[cue_at], error = %e, "Skipping malformed subtitle cue");
                continue;
            }
        };
        let text = lines[cue_at + 1..]
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            continue;
        }
        items.push(SubtitleItem { start, end, text });
    }

    Ok(items)
}

fn parse_cue_line(line: &str) -> MediaResult<(f64, f64)> {
    let (left, right) = line
        .split_once("-->")
        .ok_or_else(|| MediaError::subtitle(format!("no arrow in cue line: {line}")))?;
    // cue settings may follow the end time
    let right = right.split_whitespace().next().unwrap_or_default();
    let start = parse_timestamp(left).map_err(|e| MediaError::subtitle(e.to_string()))?;
    let end = parse_timestamp(right).map_err(|e| MediaError::subtitle(e.to_string()))?;
    if end <= start {
        return Err(MediaError::subtitle(format!(
            "cue ends before it starts: {line}"
        )));
    }
    Ok((start, end))
}

/// Read and parse an SRT file.
pub async fn read_srt(path: &Path) -> MediaResult<Vec<SubtitleItem>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let content = tokio::fs::read_to_string(path).await?;
    parse_srt(&content)
}

/// Shift every cue by `offset` seconds.
///
/// Cues that end at or before zero are dropped; starts before zero are
/// clamped to zero.
pub fn shift_items(items: Vec<SubtitleItem>, offset: f64) -> Vec<SubtitleItem> {
    if offset == 0.0 || !offset.is_finite() {
        return items;
    }
    items
        .into_iter()
        .filter_map(|item| {
            let end = item.end + offset;
            if end <= 0.0 {
                return None;
            }
            Some(SubtitleItem {
                start: (item.start + offset).max(0.0),
                end,
                text: item.text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\r\n00:00:00,000 --> 00:00:02,500\r\nHello there\r\n\r\n2\r\n00:00:02.500 --> 00:00:05,000\r\nsecond line\r\ncontinues\r\n\r\n";

    #[test]
    fn test_parse_crlf_and_dot_millis() {
        let items = parse_srt(SAMPLE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], SubtitleItem::new(0.0, 2.5, "Hello there"));
        assert_eq!(items[1].start, 2.5);
        assert_eq!(items[1].text, "second line\ncontinues");
    }

    #[test]
    fn test_malformed_cue_is_skipped() {
        let srt = "1\n00:00:xx,000 --> 00:00:01,000\nbad\n\n2\n00:00:01,000 --> 00:00:02,000\ngood\n";
        let items = parse_srt(srt).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "good");
    }

    #[test]
    fn test_negative_offset_moves_window_earlier() {
        let items = shift_items(vec![SubtitleItem::new(2.0, 4.0, "hello")], -1.0);
        assert_eq!(items, vec![SubtitleItem::new(1.0, 3.0, "hello")]);
        assert!(items[0].is_active_at(1.0));
        assert!(items[0].is_active_at(2.99));
        assert!(!items[0].is_active_at(3.0));
    }

    #[test]
    fn test_shift_drops_and_clamps() {
        let items = vec![
            SubtitleItem::new(0.0, 0.5, "gone"),
            SubtitleItem::new(0.5, 2.0, "clamped"),
        ];
        let shifted = shift_items(items, -1.0);
        assert_eq!(shifted, vec![SubtitleItem::new(0.0, 1.0, "clamped")]);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_srt(Path::new("/nonexistent/subs.srt")).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
