//! Caller-facing status report.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::generation::GenerationStatus;

/// Progress shown while the task sits in the upstream queue.
pub const PROGRESS_QUEUED: u8 = 10;
/// Progress shown while the upstream reports active generation.
pub const PROGRESS_GENERATING: u8 = 50;
/// Progress shown when the upstream status cannot be determined yet.
pub const PROGRESS_UNKNOWN: u8 = 30;
/// Progress of a completed task.
pub const PROGRESS_DONE: u8 = 100;

/// Status response returned to the polling caller.
///
/// Every reconciliation path produces one of these; `error` and `warning`
/// carry anything non-nominal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusReport {
    pub task_id: String,
    pub status: GenerationStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Raw upstream status when it maps to no canonical outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
}

impl StatusReport {
    fn base(task_id: impl Into<String>, status: GenerationStatus, progress: u8) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            progress,
            video_url: None,
            error: None,
            warning: None,
            note: None,
            status_detail: None,
        }
    }

    /// Completed with the final video URL.
    pub fn completed(task_id: impl Into<String>, video_url: Option<String>) -> Self {
        let mut report = Self::base(task_id, GenerationStatus::Completed, PROGRESS_DONE);
        report.video_url = video_url;
        report
    }

    /// Still processing at the given progress.
    pub fn processing(task_id: impl Into<String>, progress: u8) -> Self {
        Self::base(task_id, GenerationStatus::Processing, progress)
    }

    /// Terminal failure.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut report = Self::base(task_id, GenerationStatus::Failed, 0);
        report.error = Some(error.into());
        report
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_status_detail(mut self, detail: impl Into<String>) -> Self {
        self.status_detail = Some(detail.into());
        self
    }
}
