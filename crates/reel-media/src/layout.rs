//! Per-task directory layout.
//!
//! ```text
//! <tasks_root>/<task_id>/
//!   segments.json
//!   audio.mp3, subtitle.srt
//!   clips/seg-<n>.mp4
//!   thumbs/<segment_id>.jpg
//!   preview-<tag>.mp4 | combined-1.mp4 | final-1.mp4
//!   temp-merged-video.mp4, temp-merged-next.mp4
//! ```

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use reel_models::TaskId;

use crate::error::{EngineError, EngineResult};

/// Longest preview tag kept in a file name.
pub const MAX_PREVIEW_TAG_LEN: usize = 40;

/// Paths owned by one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    root: PathBuf,
}

impl TaskPaths {
    /// Layout for `task_id` under `tasks_root`. Ids that could escape the
    /// root are rejected.
    pub fn new(tasks_root: impl AsRef<Path>, task_id: &TaskId) -> EngineResult<Self> {
        if !task_id.is_path_safe() {
            return Err(EngineError::invalid_input(format!(
                "invalid task id: {}",
                task_id
            )));
        }
        Ok(Self {
            root: tasks_root.as_ref().join(task_id.as_str()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn segments_file(&self) -> PathBuf {
        self.root.join("segments.json")
    }

    /// Narration left in the task directory by an earlier step.
    pub fn narration_audio(&self) -> PathBuf {
        self.root.join("audio.mp3")
    }

    pub fn subtitle_file(&self) -> PathBuf {
        self.root.join("subtitle.srt")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.root.join("clips")
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.root.join("thumbs")
    }

    /// Scratch file for the segment at 1-based timeline position `n`.
    pub fn baked_clip(&self, n: usize) -> PathBuf {
        self.clips_dir().join(format!("seg-{}.mp4", n))
    }

    pub fn thumbnail(&self, segment_id: &str) -> PathBuf {
        self.thumbs_dir()
            .join(format!("{}.jpg", sanitize_component(segment_id)))
    }

    pub fn preview(&self, tag: &str) -> PathBuf {
        self.root.join(format!("preview-{}.mp4", tag))
    }

    pub fn combined(&self, n: u32) -> PathBuf {
        self.root.join(format!("combined-{}.mp4", n))
    }

    pub fn final_output(&self, n: u32) -> PathBuf {
        self.root.join(format!("final-{}.mp4", n))
    }

    pub fn merge_accumulator(&self) -> PathBuf {
        self.root.join("temp-merged-video.mp4")
    }

    pub fn merge_temp(&self) -> PathBuf {
        self.root.join("temp-merged-next.mp4")
    }

    /// Rendered outputs a thumbnail can fall back to, final outputs first.
    pub async fn rendered_outputs(&self) -> Vec<PathBuf> {
        let mut finals = Vec::new();
        let mut combined = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return Vec::new();
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".mp4") {
                continue;
            }
            if name.starts_with("final-") {
                finals.push(entry.path());
            } else if name.starts_with("combined-") {
                combined.push(entry.path());
            }
        }
        finals.sort();
        combined.sort();
        finals.extend(combined);
        finals
    }

    /// Create the task root and its scratch subdirectories.
    pub async fn ensure_dirs(&self) -> EngineResult<()> {
        tokio::fs::create_dir_all(self.clips_dir()).await?;
        tokio::fs::create_dir_all(self.thumbs_dir()).await?;
        Ok(())
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid regex"))
}

fn sanitize_component(raw: &str) -> String {
    unsafe_chars().replace_all(raw, "-").into_owned()
}

/// File-name tag for a preview render.
///
/// Characters outside `[A-Za-z0-9_-]` become `-`, the result is cut to
/// [`MAX_PREVIEW_TAG_LEN`] and an empty label falls back to the current UNIX
/// timestamp.
pub fn preview_tag(label: Option<&str>) -> String {
    let tag: String = sanitize_component(label.unwrap_or("").trim())
        .chars()
        .take(MAX_PREVIEW_TAG_LEN)
        .collect();
    if tag.is_empty() {
        chrono::Utc::now().timestamp().to_string()
    } else {
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let paths = TaskPaths::new("/data/tasks", &TaskId::from("t1")).unwrap();
        assert_eq!(paths.segments_file(), PathBuf::from("/data/tasks/t1/segments.json"));
        assert_eq!(paths.baked_clip(3), PathBuf::from("/data/tasks/t1/clips/seg-3.mp4"));
        assert_eq!(paths.combined(1), PathBuf::from("/data/tasks/t1/combined-1.mp4"));
        assert_eq!(paths.final_output(1), PathBuf::from("/data/tasks/t1/final-1.mp4"));
        assert_eq!(paths.thumbnail("seg-1-ab"), PathBuf::from("/data/tasks/t1/thumbs/seg-1-ab.jpg"));
        assert_eq!(paths.narration_audio(), PathBuf::from("/data/tasks/t1/audio.mp3"));
        assert_eq!(paths.subtitle_file(), PathBuf::from("/data/tasks/t1/subtitle.srt"));
    }

    #[test]
    fn test_unsafe_task_id_rejected() {
        assert!(TaskPaths::new("/data", &TaskId::from("../etc")).is_err());
    }

    #[test]
    fn test_preview_tag_normalisation() {
        assert_eq!(preview_tag(Some("seg 1/ä")), "seg-1--");
        assert_eq!(preview_tag(Some(&"x".repeat(60))).len(), MAX_PREVIEW_TAG_LEN);
        let fallback = preview_tag(Some("   "));
        assert!(fallback.chars().all(|c| c.is_ascii_digit()));
        assert!(!preview_tag(None).is_empty());
    }

    #[tokio::test]
    async fn test_rendered_outputs_prefers_final() {
        let dir = TempDir::new().unwrap();
        let paths = TaskPaths::new(dir.path(), &TaskId::from("t")).unwrap();
        paths.ensure_dirs().await.unwrap();
        std::fs::write(paths.combined(1), b"c").unwrap();
        std::fs::write(paths.final_output(1), b"f").unwrap();
        std::fs::write(paths.preview("x"), b"p").unwrap();
        assert_eq!(
            paths.rendered_outputs().await,
            vec![paths.final_output(1), paths.combined(1)]
        );
    }
}
