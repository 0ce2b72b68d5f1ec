//! Task status reconciliation.
//!
//! One poll from a caller drives the full reconciliation cycle:
//! - reactive timeout check against the record's submission time
//! - candidate req_key probing until one key matches the task
//! - persistence of any confirmed transition
//!
//! History writes are best effort. A degraded store never blocks a status
//! answer; the report carries a warning instead.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vgen_history::{timeout_message, HistoryError, HistoryStore};
use vgen_models::{
    GenerationRecord, GenerationStatus, KeyConfig, StatusReport, TaskId, PROGRESS_GENERATING,
    PROGRESS_QUEUED, PROGRESS_UNKNOWN,
};
use vgen_storage::VideoRehoster;
use vgen_upstream::{TaskProbe, UpstreamClient};

const HISTORY_DEGRADED_WARNING: &str = "History is unavailable; this result was not persisted";
const CONCURRENCY_WARNING: &str = "Upstream concurrency limit reached, retry shortly";
const UNRESOLVED_NOTE: &str = "Task status not yet resolvable under any known routing key";
const EXPIRED_ERROR: &str = "Task not found or expired upstream";
const UNRESOLVABLE_ERROR: &str = "Task status unresolvable, possibly expired";

/// Reconciles a task's stored record with the upstream status.
pub struct Reconciler {
    keys: KeyConfig,
    history: Arc<dyn HistoryStore>,
    upstream: Arc<UpstreamClient>,
    rehoster: Option<Arc<VideoRehoster>>,
    timeout: chrono::Duration,
}

impl Reconciler {
    pub fn new(
        keys: KeyConfig,
        history: Arc<dyn HistoryStore>,
        upstream: Arc<UpstreamClient>,
        rehoster: Option<Arc<VideoRehoster>>,
        timeout: chrono::Duration,
    ) -> Self {
        Self {
            keys,
            history,
            upstream,
            rehoster,
            timeout,
        }
    }

    /// Run one reconciliation cycle and produce the caller-facing report.
    pub async fn reconcile(&self, task_id: &TaskId) -> StatusReport {
        let mut degraded = false;

        let record = match self.history.get(task_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "History read failed");
                degraded = true;
                None
            }
        };

        // Terminal records answer from storage alone
        if let Some(record) = record.as_ref().filter(|r| r.is_terminal()) {
            return report_from_record(record);
        }

        // Reactive timeout: fail before wasting upstream probes
        if let Some(record) = record.as_ref().filter(|r| r.is_stale(self.timeout)) {
            let message = timeout_message(record.age_minutes());
            info!(
                task_id = %task_id,
                age_minutes = record.age_minutes(),
                "Failing timed-out task"
            );
            degraded |= !self.best_effort_fail(task_id, &message).await;
            return self.finish(StatusReport::failed(task_id.as_str(), message), degraded);
        }

        let stored_key = record.as_ref().and_then(|r| r.req_key.as_ref());
        let candidates = self.keys.candidates(stored_key);

        for req_key in &candidates {
            match self.upstream.query_task(req_key, task_id).await {
                Ok(TaskProbe::Done { video_url }) => {
                    let report = match video_url {
                        Some(url) => {
                            let final_url = self.final_video_url(task_id, &url).await;
                            degraded |= !self.best_effort_complete(task_id, &final_url).await;
                            StatusReport::completed(task_id.as_str(), Some(final_url))
                        }
                        None => StatusReport::completed(task_id.as_str(), None)
                            .with_note("Upstream reported done without a video URL"),
                    };
                    return self.finish(report, degraded);
                }
                Ok(TaskProbe::InQueue) => {
                    degraded |= !self.best_effort_mark_processing(task_id).await;
                    return self.finish(
                        StatusReport::processing(task_id.as_str(), PROGRESS_QUEUED),
                        degraded,
                    );
                }
                Ok(TaskProbe::Generating) => {
                    degraded |= !self.best_effort_mark_processing(task_id).await;
                    return self.finish(
                        StatusReport::processing(task_id.as_str(), PROGRESS_GENERATING),
                        degraded,
                    );
                }
                Ok(TaskProbe::NotFound) | Ok(TaskProbe::Expired) => {
                    degraded |= !self.best_effort_fail(task_id, EXPIRED_ERROR).await;
                    return self
                        .finish(StatusReport::failed(task_id.as_str(), EXPIRED_ERROR), degraded);
                }
                Ok(TaskProbe::Unknown(raw)) => {
                    // The key matched (success code) but the status has no
                    // canonical mapping. Report progress without persisting.
                    debug!(task_id = %task_id, status = %raw, "Unmapped upstream status");
                    return self.finish(
                        StatusReport::processing(task_id.as_str(), PROGRESS_UNKNOWN)
                            .with_status_detail(raw),
                        degraded,
                    );
                }
                Err(e) if e.is_concurrency_limit() => {
                    // Backing off beats burning the remaining candidates.
                    // The task may well be fine; never fail it here.
                    info!(task_id = %task_id, "Upstream concurrency limit during status probe");
                    return self.finish(
                        StatusReport::processing(task_id.as_str(), PROGRESS_UNKNOWN)
                            .with_warning(CONCURRENCY_WARNING),
                        degraded,
                    );
                }
                Err(e) => {
                    // Inconclusive for this key (usually a req_key mismatch)
                    debug!(task_id = %task_id, req_key = %req_key, error = %e, "Candidate probe inconclusive");
                }
            }
        }

        // Every candidate was inconclusive. A record past its deadline is
        // failed; otherwise the task may still be propagating upstream.
        if record.as_ref().is_some_and(|r| r.is_stale(self.timeout)) {
            degraded |= !self.best_effort_fail(task_id, UNRESOLVABLE_ERROR).await;
            return self.finish(
                StatusReport::failed(task_id.as_str(), UNRESOLVABLE_ERROR),
                degraded,
            );
        }

        self.finish(
            StatusReport::processing(task_id.as_str(), PROGRESS_UNKNOWN).with_note(UNRESOLVED_NOTE),
            degraded,
        )
    }

    fn finish(&self, mut report: StatusReport, degraded: bool) -> StatusReport {
        if degraded {
            // Append so a probe warning (e.g. concurrency) is never lost
            report.warning = Some(match report.warning.take() {
                Some(existing) => format!("{existing}; {HISTORY_DEGRADED_WARNING}"),
                None => HISTORY_DEGRADED_WARNING.to_string(),
            });
        }
        report
    }

    /// Resolve the URL stored on completion, re-hosting when configured.
    async fn final_video_url(&self, task_id: &TaskId, upstream_url: &str) -> String {
        match &self.rehoster {
            Some(rehoster) => {
                let name = format!("{task_id}.mp4");
                rehoster
                    .rehost(upstream_url, &name)
                    .await
                    .unwrap_or_else(|| upstream_url.to_string())
            }
            None => upstream_url.to_string(),
        }
    }

    async fn best_effort_complete(&self, task_id: &TaskId, video_url: &str) -> bool {
        best_effort(
            task_id,
            "complete",
            self.history.complete(task_id, video_url, None).await,
        )
    }

    async fn best_effort_fail(&self, task_id: &TaskId, error: &str) -> bool {
        best_effort(task_id, "fail", self.history.fail(task_id, error).await)
    }

    async fn best_effort_mark_processing(&self, task_id: &TaskId) -> bool {
        best_effort(
            task_id,
            "mark_processing",
            self.history.mark_processing(task_id).await,
        )
    }
}

/// Log and swallow a history write failure. Returns false when degraded.
fn best_effort(task_id: &TaskId, op: &str, result: Result<bool, HistoryError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!(task_id = %task_id, op, error = %e, "Best-effort history write failed");
            false
        }
    }
}

fn report_from_record(record: &GenerationRecord) -> StatusReport {
    match record.status {
        GenerationStatus::Completed => {
            StatusReport::completed(record.task_id.as_str(), record.video_url.clone())
        }
        GenerationStatus::Failed => StatusReport::failed(
            record.task_id.as_str(),
            record
                .error_message
                .clone()
                .unwrap_or_else(|| "Task failed".to_string()),
        ),
        _ => unreachable!("only terminal records reach here"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use vgen_history::MemoryHistory;
    use vgen_models::{ModelVersion, ReqKey};
    use vgen_storage::{ObjectStore, StorageConfig, VideoRehoster};
    use vgen_upstream::UpstreamConfig;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn upstream(endpoint: &str) -> Arc<UpstreamClient> {
        Arc::new(
            UpstreamClient::new(UpstreamConfig {
                endpoint: endpoint.to_string(),
                access_key_id: "test-ak".to_string(),
                secret_access_key: "test-sk".to_string(),
                region: "cn-north-1".to_string(),
                service: "cv".to_string(),
                timeout_secs: 5,
            })
            .unwrap(),
        )
    }

    fn reconciler(endpoint: &str, history: Arc<dyn HistoryStore>) -> Reconciler {
        Reconciler::new(
            KeyConfig::new(ModelVersion::V30Pro),
            history,
            upstream(endpoint),
            None,
            Duration::minutes(5),
        )
    }

    fn record(task_id: &str) -> GenerationRecord {
        GenerationRecord::new(
            TaskId::from(task_id),
            "a cat surfing",
            5,
            24,
            1280,
            720,
            "720p",
            "3.0pro",
            ReqKey::from("i2v_first_v30_jimeng"),
        )
    }

    fn status_body(status: &str) -> serde_json::Value {
        serde_json::json!({
            "code": 10000,
            "data": {"status": status},
            "message": "Success"
        })
    }

    #[tokio::test]
    async fn test_in_queue_marks_processing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "CVSync2AsyncGetResult"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body("in_queue")))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        assert_eq!(report.progress, PROGRESS_QUEUED);
        assert!(report.warning.is_none());

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Processing);
    }

    #[tokio::test]
    async fn test_timed_out_record_fails_without_probing() {
        // No mocks mounted: any upstream call would be inconclusive, but the
        // timeout check must short-circuit before the candidate loop.
        let server = MockServer::start().await;

        let history = Arc::new(MemoryHistory::new());
        let mut rec = record("t1");
        rec.created_at = Utc::now() - Duration::minutes(6);
        history.create(&rec).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Failed);
        assert!(report.error.unwrap().contains("timed out"));
        assert!(server.received_requests().await.unwrap().is_empty());

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn test_all_candidates_inconclusive_keeps_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 50411,
                "message": "Invalid task id for req_key"
            })))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        assert_eq!(report.progress, PROGRESS_UNKNOWN);
        assert!(report.note.is_some());

        // 4 distinct candidate keys probed
        assert_eq!(server.received_requests().await.unwrap().len(), 4);

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Pending);
    }

    #[tokio::test]
    async fn test_stored_key_mismatch_falls_through_to_match() {
        let server = MockServer::start().await;
        // Stored key answers with a mismatch code, the 720p tail key matches
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"req_key": "i2v_first_v30_jimeng"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 50411,
                "message": "mismatch"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"req_key": "i2v_first_tail_v30_jimeng"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body("generating")))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history)
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        assert_eq!(report.progress, PROGRESS_GENERATING);
    }

    #[tokio::test]
    async fn test_done_completes_record_with_upstream_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10000,
                "data": {"status": "done", "video_url": "https://up/v.mp4"},
                "message": "Success"
            })))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some("https://up/v.mp4"));

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
        assert_eq!(stored.video_url.as_deref(), Some("https://up/v.mp4"));
        assert_eq!(stored.video_name.as_deref(), Some("t1.mp4"));
    }

    #[tokio::test]
    async fn test_terminal_record_answers_from_storage() {
        let server = MockServer::start().await;

        let history = Arc::new(MemoryHistory::new());
        let mut rec = record("t1");
        rec.complete("https://cdn/v.mp4");
        history.create(&rec).await.unwrap();

        let report = reconciler(&server.uri(), history)
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some("https://cdn/v.mp4"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_limit_reports_processing_with_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 50430,
                "message": "Request Over Concurrent Limit"
            })))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        assert!(report.warning.unwrap().contains("concurrency"));
        // Backs off after the first candidate instead of probing the rest
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_status_reports_detail_without_persisting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(status_body("post_processing")),
            )
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        assert_eq!(report.progress, PROGRESS_UNKNOWN);
        assert_eq!(report.status_detail.as_deref(), Some("post_processing"));

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Pending);
    }

    #[tokio::test]
    async fn test_not_found_fails_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body("not_found")))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let report = reconciler(&server.uri(), history.clone())
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Failed);

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn test_degraded_history_still_answers_with_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10000,
                "data": {"status": "done", "video_url": "https://up/v.mp4"},
                "message": "Success"
            })))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::unavailable());

        let report = reconciler(&server.uri(), history)
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some("https://up/v.mp4"));
        assert!(report.warning.is_some());
    }

    #[tokio::test]
    async fn test_degraded_history_keeps_concurrency_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 50430,
                "message": "Request Over Concurrent Limit"
            })))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::unavailable());

        let report = reconciler(&server.uri(), history)
            .reconcile(&TaskId::from("t1"))
            .await;

        assert_eq!(report.status, GenerationStatus::Processing);
        let warning = report.warning.unwrap();
        assert!(warning.contains("concurrency"));
        assert!(warning.contains("History is unavailable"));
    }

    #[tokio::test]
    async fn test_failed_rehost_completes_with_upstream_url() {
        let server = MockServer::start().await;
        let video_url = format!("{}/video.mp4", server.uri());
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10000,
                "data": {"status": "done", "video_url": video_url},
                "message": "Success"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let rehoster = VideoRehoster::new(ObjectStore::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:1".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
            bucket_name: "videos".to_string(),
            region: "auto".to_string(),
            public_base_url: "https://cdn.example.com".to_string(),
        }))
        .unwrap();

        let history = Arc::new(MemoryHistory::new());
        history.create(&record("t1")).await.unwrap();

        let reconciler = Reconciler::new(
            KeyConfig::new(ModelVersion::V30Pro),
            history.clone(),
            upstream(&server.uri()),
            Some(Arc::new(rehoster)),
            Duration::minutes(5),
        );
        let report = reconciler.reconcile(&TaskId::from("t1")).await;

        // Re-hosting failed, so the upstream URL survives end to end
        assert_eq!(report.status, GenerationStatus::Completed);
        assert_eq!(report.video_url.as_deref(), Some(video_url.as_str()));

        let stored = history.get(&TaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
        assert_eq!(stored.video_url.as_deref(), Some(video_url.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_task_without_record_probes_baseline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body("in_queue")))
            .mount(&server)
            .await;

        let history = Arc::new(MemoryHistory::new());

        let report = reconciler(&server.uri(), history)
            .reconcile(&TaskId::from("t-unseen"))
            .await;

        // No record: still answered from the first matching baseline key
        assert_eq!(report.status, GenerationStatus::Processing);
        assert_eq!(report.progress, PROGRESS_QUEUED);
    }
}
