//! Job payloads for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reel_models::{ConcatMode, RenderParams, SegmentDescriptor, TaskId};

fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_max_clip_duration() -> f64 {
    5.0
}

/// Job to plan a timeline for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanJob {
    /// Unique job ID
    pub job_id: String,
    pub task_id: TaskId,
    /// Material files (videos or stills)
    pub materials: Vec<String>,
    /// Narration audio; its duration becomes the target when set
    #[serde(default)]
    pub narration: Option<String>,
    /// Explicit target duration in seconds, used without narration
    #[serde(default)]
    pub target_duration: Option<f64>,
    #[serde(default)]
    pub concat_mode: ConcatMode,
    #[serde(default = "default_max_clip_duration")]
    pub max_clip_duration: f64,
    pub created_at: DateTime<Utc>,
}

impl PlanJob {
    pub fn new(task_id: TaskId, materials: Vec<String>) -> Self {
        Self {
            job_id: new_job_id(),
            task_id,
            materials,
            narration: None,
            target_duration: None,
            concat_mode: ConcatMode::default(),
            max_clip_duration: default_max_clip_duration(),
            created_at: Utc::now(),
        }
    }

    pub fn with_narration(mut self, path: impl Into<String>) -> Self {
        self.narration = Some(path.into());
        self
    }

    pub fn with_target_duration(mut self, seconds: f64) -> Self {
        self.target_duration = Some(seconds);
        self
    }

    pub fn with_concat_mode(mut self, mode: ConcatMode) -> Self {
        self.concat_mode = mode;
        self
    }

    pub fn with_max_clip_duration(mut self, seconds: f64) -> Self {
        self.max_clip_duration = seconds;
        self
    }
}

/// Job to render a task's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    /// Unique job ID
    pub job_id: String,
    pub task_id: TaskId,
    /// Timeline to render; the persisted `segments.json` when absent
    #[serde(default)]
    pub segments: Option<Vec<SegmentDescriptor>>,
    #[serde(default)]
    pub params: RenderParams,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub preview_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(task_id: TaskId, params: RenderParams) -> Self {
        Self {
            job_id: new_job_id(),
            task_id,
            segments: None,
            params,
            narration: None,
            subtitles: None,
            preview: false,
            preview_label: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_segments(mut self, segments: Vec<SegmentDescriptor>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn with_narration(mut self, path: impl Into<String>) -> Self {
        self.narration = Some(path.into());
        self
    }

    pub fn with_subtitles(mut self, path: impl Into<String>) -> Self {
        self.subtitles = Some(path.into());
        self
    }

    pub fn as_preview(mut self, label: Option<String>) -> Self {
        self.preview = true;
        self.preview_label = label;
        self
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Plan(PlanJob),
    Render(RenderJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &str {
        match self {
            QueueJob::Plan(j) => &j.job_id,
            QueueJob::Render(j) => &j.job_id,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueJob::Plan(j) => &j.task_id,
            QueueJob::Render(j) => &j.task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::Plan(_) => "plan",
            QueueJob::Render(_) => "render",
        }
    }

    /// Key under which duplicate submissions of the same job are rejected.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.kind(), self.task_id(), self.job_id())
    }
}

impl From<PlanJob> for QueueJob {
    fn from(job: PlanJob) -> Self {
        QueueJob::Plan(job)
    }
}

impl From<RenderJob> for QueueJob {
    fn from(job: RenderJob) -> Self {
        QueueJob::Render(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_tagged() {
        let job = QueueJob::from(PlanJob::new(TaskId::from("t1"), vec!["/m/a.mp4".into()]));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "plan");
        assert_eq!(json["task_id"], "t1");
    }

    #[test]
    fn test_render_job_defaults_from_sparse_payload() {
        let json = r#"{"type":"render","job_id":"j1","task_id":"t1","created_at":"2024-01-01T00:00:00Z"}"#;
        let QueueJob::Render(job) = serde_json::from_str::<QueueJob>(json).unwrap() else {
            panic!("expected render job");
        };
        assert_eq!(job.segments, None);
        assert_eq!(job.params, RenderParams::default());
        assert!(!job.preview);
    }

    #[test]
    fn test_idempotency_key() {
        let mut job = RenderJob::new(TaskId::from("t9"), RenderParams::default());
        job.job_id = "j1".into();
        assert_eq!(QueueJob::from(job).idempotency_key(), "render:t9:j1");
    }
}
