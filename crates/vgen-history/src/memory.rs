//! In-memory history store.
//!
//! Used when no database is configured and as the store of record in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;
use tracing::info;

use vgen_models::{GenerationRecord, GenerationStatus, TaskId};

use crate::error::{HistoryError, HistoryResult};
use crate::store::{timeout_message, HistoryPage, HistoryQuery, HistoryStore};

/// In-memory history store backed by a task-id map.
#[derive(Default)]
pub struct MemoryHistory {
    records: RwLock<HashMap<String, GenerationRecord>>,
    unavailable: AtomicBool,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every operation, for exercising degraded mode.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.unavailable.store(true, Ordering::Relaxed);
        store
    }

    fn check_available(&self) -> HistoryResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(HistoryError::unavailable("memory store marked unavailable"))
        } else {
            Ok(())
        }
    }

    /// Apply a mutation to a record while it is still active.
    async fn update_if_active<F>(&self, task_id: &TaskId, apply: F) -> HistoryResult<bool>
    where
        F: FnOnce(&mut GenerationRecord),
    {
        self.check_available()?;
        let mut records = self.records.write().await;
        match records.get_mut(task_id.as_str()) {
            Some(record) if !record.is_terminal() => {
                apply(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn create(&self, record: &GenerationRecord) -> HistoryResult<()> {
        self.check_available()?;
        let mut records = self.records.write().await;
        if records.contains_key(record.task_id.as_str()) {
            return Err(HistoryError::Duplicate(record.task_id.to_string()));
        }
        records.insert(record.task_id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> HistoryResult<Option<GenerationRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(task_id.as_str()).cloned())
    }

    async fn list(&self, query: &HistoryQuery) -> HistoryResult<HistoryPage> {
        self.check_available()?;
        let records = self.records.read().await;

        let mut matching: Vec<&GenerationRecord> = records
            .values()
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .collect();
        // Newest first; tie-break on task_id for deterministic paging
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.task_id.as_str().cmp(b.task_id.as_str()))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(HistoryPage { total, items })
    }

    async fn delete(&self, task_id: &TaskId) -> HistoryResult<bool> {
        self.check_available()?;
        Ok(self.records.write().await.remove(task_id.as_str()).is_some())
    }

    async fn mark_processing(&self, task_id: &TaskId) -> HistoryResult<bool> {
        self.check_available()?;
        let mut records = self.records.write().await;
        match records.get_mut(task_id.as_str()) {
            Some(record) if record.status == GenerationStatus::Pending => {
                record.mark_processing();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        video_url: &str,
        video_name: Option<&str>,
    ) -> HistoryResult<bool> {
        self.update_if_active(task_id, |record| {
            record.complete(video_url);
            record.video_name = video_name
                .map(str::to_string)
                .or_else(|| Some(format!("{}.mp4", record.task_id)));
        })
        .await
    }

    async fn fail(&self, task_id: &TaskId, error: &str) -> HistoryResult<bool> {
        self.update_if_active(task_id, |record| record.fail(error)).await
    }

    async fn sweep_timed_out(&self, deadline: Duration) -> HistoryResult<u32> {
        self.check_available()?;
        let mut records = self.records.write().await;

        let mut swept = 0u32;
        for record in records.values_mut() {
            if record.is_stale(deadline) {
                let minutes = record.age_minutes();
                record.fail(timeout_message(minutes));
                swept += 1;
            }
        }

        if swept > 0 {
            info!(count = swept, "Swept timed-out generation tasks");
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vgen_models::ReqKey;

    fn record(task_id: &str) -> GenerationRecord {
        GenerationRecord::new(
            TaskId::from(task_id),
            "prompt",
            5,
            24,
            1280,
            720,
            "720p",
            "3.0pro",
            ReqKey::from("i2v_first_v30_jimeng"),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryHistory::new();
        store.create(&record("t1")).await.unwrap();

        let fetched = store.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(fetched.status, GenerationStatus::Pending);
        assert!(store.get(&TaskId::from("t2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryHistory::new();
        store.create(&record("t1")).await.unwrap();
        assert!(matches!(
            store.create(&record("t1")).await,
            Err(HistoryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_processing_only_from_pending() {
        let store = MemoryHistory::new();
        store.create(&record("t1")).await.unwrap();

        assert!(store.mark_processing(&TaskId::from("t1")).await.unwrap());
        // Second call is a no-op
        assert!(!store.mark_processing(&TaskId::from("t1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_records_are_immutable() {
        let store = MemoryHistory::new();
        store.create(&record("t1")).await.unwrap();
        let id = TaskId::from("t1");

        assert!(store.complete(&id, "https://cdn/v.mp4", None).await.unwrap());

        // All further transitions are rejected
        assert!(!store.fail(&id, "late failure").await.unwrap());
        assert!(!store.complete(&id, "https://cdn/other.mp4", None).await.unwrap());
        assert!(!store.mark_processing(&id).await.unwrap());

        let rec = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, GenerationStatus::Completed);
        assert_eq!(rec.video_url.as_deref(), Some("https://cdn/v.mp4"));
        assert!(rec.error_message.is_none());
    }

    #[tokio::test]
    async fn test_sweep_converges_and_is_idempotent() {
        let store = MemoryHistory::new();

        let mut stale = record("stale");
        stale.created_at = Utc::now() - Duration::minutes(10);
        store.create(&stale).await.unwrap();

        let fresh = record("fresh");
        store.create(&fresh).await.unwrap();

        let mut done = record("done");
        done.created_at = Utc::now() - Duration::minutes(10);
        done.complete("https://cdn/v.mp4");
        store.create(&done).await.unwrap();

        let swept = store.sweep_timed_out(Duration::minutes(5)).await.unwrap();
        assert_eq!(swept, 1);

        let stale = store.get(&TaskId::from("stale")).await.unwrap().unwrap();
        assert_eq!(stale.status, GenerationStatus::Failed);
        assert!(stale.error_message.unwrap().contains("timed out"));
        assert!(stale.completed_at.is_some());

        // Fresh record untouched, completed record untouched
        let fresh = store.get(&TaskId::from("fresh")).await.unwrap().unwrap();
        assert_eq!(fresh.status, GenerationStatus::Pending);
        let done = store.get(&TaskId::from("done")).await.unwrap().unwrap();
        assert_eq!(done.status, GenerationStatus::Completed);

        // Second sweep finds nothing
        assert_eq!(store.sweep_timed_out(Duration::minutes(5)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let store = MemoryHistory::new();
        for i in 0..5 {
            let mut rec = record(&format!("t{i}"));
            rec.created_at = Utc::now() - Duration::minutes(i);
            store.create(&rec).await.unwrap();
        }

        let page = store
            .list(&HistoryQuery {
                limit: 2,
                offset: 0,
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].task_id.as_str(), "t0");
        assert_eq!(page.items[1].task_id.as_str(), "t1");

        let filtered = store
            .list(&HistoryQuery {
                limit: 10,
                offset: 0,
                status: Some(GenerationStatus::Completed),
            })
            .await
            .unwrap();
        assert_eq!(filtered.total, 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryHistory::unavailable();
        assert!(store.get(&TaskId::from("t1")).await.is_err());
        assert!(store.create(&record("t1")).await.is_err());
        assert!(store.sweep_timed_out(Duration::minutes(5)).await.is_err());
    }
}
