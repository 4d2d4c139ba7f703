//! Task identity and state records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::segment::SegmentDescriptor;

/// Unique identifier for a task. Also names the task's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is usable as a single directory name.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the queue
    #[default]
    Pending,
    /// Being planned or rendered
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSnapshot {
    pub task_id: TaskId,

    #[serde(default)]
    pub state: TaskState,

    /// 0-100
    #[serde(default)]
    pub progress: u8,

    /// Rounded sum of planned segment durations (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,

    #[serde(default)]
    pub segments: Vec<SegmentDescriptor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combined_videos: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            progress: 0,
            audio_duration: None,
            segments: Vec::new(),
            combined_videos: Vec::new(),
            videos: Vec::new(),
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge a partial update into this snapshot.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(duration) = update.audio_duration {
            self.audio_duration = Some(duration);
        }
        if let Some(segments) = update.segments {
            self.segments = segments;
        }
        if let Some(combined) = update.combined_videos {
            self.combined_videos = combined;
        }
        if let Some(videos) = update.videos {
            self.videos = videos;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update to a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_videos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn state(state: TaskState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(TaskState::Failed),
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
