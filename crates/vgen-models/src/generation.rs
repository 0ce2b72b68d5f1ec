//! Generation task records.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::req_key::ReqKey;

/// Opaque task identifier assigned by the upstream API on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generation task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Submitted upstream, not yet confirmed in queue
    #[default]
    Pending,
    /// Confirmed in queue or generating
    Processing,
    /// Video produced successfully
    Completed,
    /// Terminal failure (upstream failure or timeout)
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GenerationStatus::Pending),
            "processing" => Some(GenerationStatus::Processing),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more transitions permitted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted record of a single generation request.
///
/// Created in `pending` by the submission flow; status transitions are owned
/// by the reconciler. Once terminal the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRecord {
    /// Upstream task ID (globally unique)
    pub task_id: TaskId,

    /// Text prompt
    pub prompt: String,

    /// Requested duration in seconds
    pub duration: u32,

    /// Requested frames per second
    pub fps: u32,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Random seed (None for upstream default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// First conditioning frame (URL or data URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,

    /// Last conditioning frame (URL or data URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,

    /// Resolution class ("720p" / "1080p")
    pub resolution: String,

    /// Model version ("3.0pro" / "3.5pro")
    pub version: String,

    /// Routing key resolved at submission time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_key: Option<ReqKey>,

    /// Current status
    #[serde(default)]
    pub status: GenerationStatus,

    /// Final video URL (set only on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Stored video file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,

    /// Error message (set only on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Terminal transition timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    /// Create a new pending record at submission time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: TaskId,
        prompt: impl Into<String>,
        duration: u32,
        fps: u32,
        width: u32,
        height: u32,
        resolution: impl Into<String>,
        version: impl Into<String>,
        req_key: ReqKey,
    ) -> Self {
        Self {
            task_id,
            prompt: prompt.into(),
            duration,
            fps,
            width,
            height,
            seed: None,
            first_frame_url: None,
            last_frame_url: None,
            resolution: resolution.into(),
            version: version.into(),
            req_key: Some(req_key),
            status: GenerationStatus::Pending,
            video_url: None,
            video_name: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Check if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Elapsed time since submission.
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// Elapsed whole-and-fractional minutes since submission.
    pub fn age_minutes(&self) -> f64 {
        self.age().num_seconds() as f64 / 60.0
    }

    /// Check if the record has exceeded the staleness deadline.
    ///
    /// Always false for terminal records.
    pub fn is_stale(&self, deadline: Duration) -> bool {
        !self.is_terminal() && self.age() > deadline
    }

    /// Mark as processing (in-queue/generating confirmed upstream).
    pub fn mark_processing(&mut self) {
        if !self.is_terminal() {
            self.status = GenerationStatus::Processing;
        }
    }

    /// Mark as completed with the final video URL.
    pub fn complete(&mut self, video_url: impl Into<String>) {
        self.status = GenerationStatus::Completed;
        self.video_url = Some(video_url.into());
        self.completed_at = Some(Utc::now());
    }

    /// Mark as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = GenerationStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Total frame count for a requested duration.
///
/// The upstream API accepts frames = 24n + 1: 121 for 5s clips, 241 for 10s.
pub fn frames_for(duration: u32, fps: u32) -> u32 {
    match duration.checked_mul(fps) {
        Some(total) if total <= 121 => 121,
        _ => 241,
    }
}
