//! Normalization of upstream task-status responses.
//!
//! The upstream reports status as a free-form string inside a loosely shaped
//! envelope. Normalization fails closed: anything unrecognized becomes
//! [`TaskProbe::Unknown`] rather than an error.

use serde::Deserialize;

/// Canonical outcome of one status probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskProbe {
    /// Generation finished; the URL may be absent on some responses.
    Done { video_url: Option<String> },
    /// Task accepted, waiting for a worker.
    InQueue,
    /// Task actively generating.
    Generating,
    /// Upstream does not know this task.
    NotFound,
    /// Task result expired upstream.
    Expired,
    /// Status string with no canonical mapping.
    Unknown(String),
}

impl TaskProbe {
    /// Normalize a raw upstream status string.
    pub fn from_status(status: &str, video_url: Option<String>) -> Self {
        match status {
            "done" => TaskProbe::Done { video_url },
            "in_queue" => TaskProbe::InQueue,
            "generating" => TaskProbe::Generating,
            "not_found" => TaskProbe::NotFound,
            "expired" => TaskProbe::Expired,
            other => TaskProbe::Unknown(other.to_string()),
        }
    }

    /// True for `not_found` / `expired`, which fail the task immediately.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(self, TaskProbe::NotFound | TaskProbe::Expired)
    }
}

/// Raw envelope of a status query response.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Option<QueryData>,
    pub message: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryData {
    pub status: Option<String>,
    pub video_url: Option<String>,
}

impl QueryResponse {
    /// Normalize the payload into a probe. Missing fields fail closed.
    pub fn into_probe(self) -> TaskProbe {
        let data = self.data.unwrap_or_default();
        match data.status {
            Some(status) => TaskProbe::from_status(&status, data.video_url),
            None => TaskProbe::Unknown(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> QueryResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_done_with_url() {
        let probe = parse(
            r#"{"code":10000,"data":{"status":"done","video_url":"https://up/v.mp4"},"message":"Success"}"#,
        )
        .into_probe();
        assert_eq!(
            probe,
            TaskProbe::Done {
                video_url: Some("https://up/v.mp4".to_string())
            }
        );
    }

    #[test]
    fn test_queue_states() {
        assert_eq!(
            parse(r#"{"code":10000,"data":{"status":"in_queue"}}"#).into_probe(),
            TaskProbe::InQueue
        );
        assert_eq!(
            parse(r#"{"code":10000,"data":{"status":"generating"}}"#).into_probe(),
            TaskProbe::Generating
        );
    }

    #[test]
    fn test_definitive_failures() {
        let not_found = parse(r#"{"code":10000,"data":{"status":"not_found"}}"#).into_probe();
        let expired = parse(r#"{"code":10000,"data":{"status":"expired"}}"#).into_probe();
        assert!(not_found.is_definitive_failure());
        assert!(expired.is_definitive_failure());
    }

    #[test]
    fn test_unknown_status_fails_closed() {
        let probe =
            parse(r#"{"code":10000,"data":{"status":"post_processing"}}"#).into_probe();
        assert_eq!(probe, TaskProbe::Unknown("post_processing".to_string()));
        assert!(!probe.is_definitive_failure());
    }

    #[test]
    fn test_missing_data_fails_closed() {
        assert_eq!(
            parse(r#"{"code":10000,"message":"Success"}"#).into_probe(),
            TaskProbe::Unknown(String::new())
        );
        assert_eq!(
            parse(r#"{"code":10000,"data":{}}"#).into_probe(),
            TaskProbe::Unknown(String::new())
        );
    }
}
