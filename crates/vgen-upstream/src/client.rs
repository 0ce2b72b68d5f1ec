//! Upstream API client.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use vgen_models::{ReqKey, TaskId};

use crate::error::{UpstreamError, UpstreamResult, CODE_SUCCESS};
use crate::probe::{QueryResponse, TaskProbe};
use crate::signing::{canonical_query, sign_request};

const ACTION_SUBMIT: &str = "CVSync2AsyncSubmitTask";
const ACTION_GET_RESULT: &str = "CVSync2AsyncGetResult";
const API_VERSION: &str = "2022-08-31";

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Signing region
    pub region: String,
    /// Signing service name
    pub service: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// Create config from environment variables.
    pub fn from_env() -> UpstreamResult<Self> {
        Ok(Self {
            endpoint: std::env::var("JIMENG_API_ENDPOINT")
                .unwrap_or_else(|_| "https://visual.volcengineapi.com".to_string()),
            access_key_id: std::env::var("VOLCENGINE_ACCESS_KEY_ID")
                .map_err(|_| UpstreamError::Config("VOLCENGINE_ACCESS_KEY_ID not set".into()))?,
            secret_access_key: std::env::var("VOLCENGINE_SECRET_ACCESS_KEY").map_err(|_| {
                UpstreamError::Config("VOLCENGINE_SECRET_ACCESS_KEY not set".into())
            })?,
            region: std::env::var("VOLCENGINE_REGION")
                .unwrap_or_else(|_| "cn-north-1".to_string()),
            service: std::env::var("VOLCENGINE_SERVICE").unwrap_or_else(|_| "cv".to_string()),
            timeout_secs: 60,
        })
    }
}

/// Submission parameters for one generation task.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub req_key: ReqKey,
    pub prompt: String,
    /// Total frame count (121 or 241)
    pub frames: u32,
    /// Random seed (-1 for upstream default)
    pub seed: i64,
    /// Conditioning images as URLs (mutually exclusive with base64)
    pub image_urls: Vec<String>,
    /// Conditioning images as base64 payloads
    pub binary_data_base64: Vec<String>,
}

/// Client for the upstream generative-video API.
pub struct UpstreamClient {
    http: Client,
    config: UpstreamConfig,
    host: String,
}

impl UpstreamClient {
    /// Create a new client from configuration.
    pub fn new(config: UpstreamConfig) -> UpstreamResult<Self> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| UpstreamError::Config(format!("Invalid endpoint URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| UpstreamError::Config("Endpoint URL has no host".into()))?
            .to_string();

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UpstreamError::Http)?;

        Ok(Self { http, config, host })
    }

    /// Create from environment variables.
    pub fn from_env() -> UpstreamResult<Self> {
        Self::new(UpstreamConfig::from_env()?)
    }

    /// Submit a generation task; returns the upstream task ID.
    pub async fn submit_task(&self, request: &SubmitRequest) -> UpstreamResult<TaskId> {
        let mut payload = serde_json::json!({
            "req_key": request.req_key.as_str(),
            "prompt": request.prompt,
            "frames": request.frames,
            "seed": request.seed,
        });

        // binary_data_base64 and image_urls are mutually exclusive upstream
        if !request.binary_data_base64.is_empty() {
            payload["binary_data_base64"] =
                serde_json::json!(request.binary_data_base64);
        } else if !request.image_urls.is_empty() {
            payload["image_urls"] = serde_json::json!(request.image_urls);
        }

        debug!(
            req_key = %request.req_key,
            frames = request.frames,
            "Submitting generation task"
        );

        let body: SubmitResponse = self.call(ACTION_SUBMIT, &payload).await?;
        body.into_task_id()
    }

    /// Query the status of a task under one candidate req_key.
    pub async fn query_task(&self, req_key: &ReqKey, task_id: &TaskId) -> UpstreamResult<TaskProbe> {
        let payload = serde_json::json!({
            "req_key": req_key.as_str(),
            "task_id": task_id.as_str(),
        });

        let body: QueryResponse = self.call(ACTION_GET_RESULT, &payload).await?;

        let code = body
            .code
            .ok_or_else(|| UpstreamError::Decode("status response missing code".into()))?;
        if code != CODE_SUCCESS {
            let message = body.message.unwrap_or_else(|| "unknown error".to_string());
            return Err(UpstreamError::from_code(code, message));
        }

        Ok(body.into_probe())
    }

    /// Issue one signed API call and decode the response body.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        payload: &serde_json::Value,
    ) -> UpstreamResult<T> {
        let query = canonical_query(&[("Action", action), ("Version", API_VERSION)]);
        let body = serde_json::to_string(payload)
            .map_err(|e| UpstreamError::Decode(format!("Failed to encode request: {e}")))?;

        let headers = sign_request(
            &self.config.access_key_id,
            &self.config.secret_access_key,
            "POST",
            &self.host,
            &query,
            &body,
            &self.config.region,
            &self.config.service,
        )?;

        let url = format!("{}/?{}", self.config.endpoint.trim_end_matches('/'), query);

        let response = self
            .http
            .post(&url)
            .header("Content-Type", headers.content_type)
            .header("X-Date", &headers.x_date)
            .header("X-Content-Sha256", &headers.x_content_sha256)
            .header("Authorization", &headers.authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|_| {
            UpstreamError::Decode(format!(
                "Unexpected response (HTTP {status}): {}",
                truncate(&text, 200)
            ))
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Raw envelope of a task submission response.
///
/// Two shapes exist in the wild: the flat `{code, data, message}` form and a
/// gateway form wrapping results in `ResponseMetadata` / `Result`.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    code: Option<i64>,
    #[serde(default)]
    data: Option<SubmitData>,
    message: Option<String>,
    #[serde(rename = "ResponseMetadata")]
    response_metadata: Option<ResponseMetadata>,
    #[serde(rename = "Result")]
    result: Option<GatewayResult>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitData {
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(rename = "Error")]
    error: Option<GatewayError>,
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayResult {
    #[serde(alias = "TaskId")]
    task_id: Option<String>,
}

impl SubmitResponse {
    fn into_task_id(self) -> UpstreamResult<TaskId> {
        match self.code {
            Some(code) if code != CODE_SUCCESS => {
                let message = self.message.unwrap_or_else(|| "unknown error".to_string());
                Err(UpstreamError::from_code(code, message))
            }
            Some(_) => self
                .data
                .unwrap_or_default()
                .task_id
                .map(TaskId::from)
                .ok_or_else(|| UpstreamError::Decode("submit response missing task_id".into())),
            None => {
                // Gateway shape
                if let Some(meta) = self.response_metadata {
                    if let Some(err) = meta.error {
                        let code = err
                            .code
                            .as_deref()
                            .and_then(|c| c.parse::<i64>().ok())
                            .unwrap_or(-1);
                        let message = format!(
                            "{} (request_id: {})",
                            err.message.unwrap_or_else(|| "unknown error".to_string()),
                            meta.request_id.unwrap_or_default()
                        );
                        return Err(UpstreamError::from_code(code, message));
                    }
                }
                self.result
                    .and_then(|r| r.task_id)
                    .map(TaskId::from)
                    .ok_or_else(|| {
                        UpstreamError::Decode("submit response missing task_id".into())
                    })
            }
        }
    }
}
