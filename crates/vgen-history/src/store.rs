//! The history store trait.

use async_trait::async_trait;
use chrono::Duration;

use vgen_models::{GenerationRecord, GenerationStatus, TaskId};

use crate::error::HistoryResult;

/// Paging and filter parameters for history listings.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub limit: u32,
    pub offset: u32,
    pub status: Option<GenerationStatus>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            status: None,
        }
    }
}

/// One page of history records.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub total: u64,
    pub items: Vec<GenerationRecord>,
}

/// Persistence collaborator for generation records.
///
/// Status mutations apply only while the record is still active
/// (`pending`/`processing`); each returns whether the write took effect.
/// Terminal records are never rewritten, which makes every transition
/// idempotent under concurrent reconciliation.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a freshly submitted record.
    async fn create(&self, record: &GenerationRecord) -> HistoryResult<()>;

    /// Fetch a record by task ID.
    async fn get(&self, task_id: &TaskId) -> HistoryResult<Option<GenerationRecord>>;

    /// List records, newest first.
    async fn list(&self, query: &HistoryQuery) -> HistoryResult<HistoryPage>;

    /// Delete a record. Returns false when it did not exist.
    async fn delete(&self, task_id: &TaskId) -> HistoryResult<bool>;

    /// Transition `pending` -> `processing`. No-op from any other state.
    async fn mark_processing(&self, task_id: &TaskId) -> HistoryResult<bool>;

    /// Transition an active record to `completed` with the final video URL.
    async fn complete(
        &self,
        task_id: &TaskId,
        video_url: &str,
        video_name: Option<&str>,
    ) -> HistoryResult<bool>;

    /// Transition an active record to `failed` with an error message.
    async fn fail(&self, task_id: &TaskId, error: &str) -> HistoryResult<bool>;

    /// Transition every active record older than `deadline` to `failed`.
    ///
    /// Returns the number of records swept. Idempotent: already-terminal
    /// records are filtered out, so a second pass sweeps nothing.
    async fn sweep_timed_out(&self, deadline: Duration) -> HistoryResult<u32>;
}

/// Human-readable timeout failure message.
pub fn timeout_message(elapsed_minutes: f64) -> String {
    format!(
        "Task timed out after {elapsed_minutes:.1} minutes (generation normally completes within 1-3 minutes)"
    )
}
