//! Generation submission handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vgen_models::{frames_for, FrameMode, GenerationRecord, ModelVersion, Resolution};
use vgen_upstream::SubmitRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_PROMPT_CHARS: usize = 2000;
const DEFAULT_DURATION_SECS: u32 = 5;
const MAX_DURATION_SECS: u32 = 10;
const DEFAULT_FPS: u32 = 24;
const MAX_FPS: u32 = 60;

/// Generation request body.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub duration: Option<u32>,
    pub fps: Option<u32>,
    /// "720p" / "1080p"
    pub resolution: Option<String>,
    /// "3.0pro" / "3.5pro"; defaults to the configured version
    pub version: Option<String>,
    pub seed: Option<i64>,
    /// First conditioning frame: URL or data URI
    pub first_frame: Option<String>,
    /// Last conditioning frame: URL or data URI
    pub last_frame: Option<String>,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub task_id: String,
    pub status: String,
    pub req_key: String,
    pub frames: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Submit a generation task upstream and record it as pending.
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::bad_request(format!(
            "prompt must be at most {} characters",
            MAX_PROMPT_CHARS
        )));
    }

    let duration = request.duration.unwrap_or(DEFAULT_DURATION_SECS);
    if duration == 0 || duration > MAX_DURATION_SECS {
        return Err(ApiError::bad_request(format!(
            "duration must be between 1 and {} seconds",
            MAX_DURATION_SECS
        )));
    }
    let fps = request.fps.unwrap_or(DEFAULT_FPS);
    if fps == 0 || fps > MAX_FPS {
        return Err(ApiError::bad_request(format!(
            "fps must be between 1 and {}",
            MAX_FPS
        )));
    }

    let version = match request.version.as_deref() {
        Some(s) => ModelVersion::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("unknown model version '{s}'")))?,
        None => state.config.model_version,
    };

    let resolution = match request.resolution.as_deref() {
        Some(s) => Resolution::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("unknown resolution '{s}'")))?,
        // 3.5pro only serves 1080p
        None if version == ModelVersion::V35Pro => Resolution::P1080,
        None => Resolution::default(),
    };

    if version == ModelVersion::V35Pro {
        if resolution != Resolution::P1080 {
            return Err(ApiError::bad_request("3.5pro only supports 1080p"));
        }
        if request.last_frame.is_some() {
            return Err(ApiError::bad_request(
                "3.5pro supports first-frame conditioning only",
            ));
        }
    }

    let mode = FrameMode::from_frames(
        request.first_frame.is_some(),
        request.last_frame.is_some(),
    );
    let keys = vgen_models::KeyConfig::new(version);
    let req_key = keys.req_key(resolution, mode);
    let frames = frames_for(duration, fps);
    let (width, height) = resolution.dimensions();

    let mut image_urls = Vec::new();
    let mut binary_data_base64 = Vec::new();
    for frame in [&request.first_frame, &request.last_frame]
        .into_iter()
        .flatten()
    {
        match data_uri_payload(frame) {
            Some(b64) => binary_data_base64.push(b64.to_string()),
            None => image_urls.push(frame.clone()),
        }
    }

    info!(
        req_key = %req_key,
        version = %version,
        resolution = %resolution,
        frames,
        "Submitting generation"
    );

    let task_id = state
        .upstream
        .submit_task(&SubmitRequest {
            req_key: req_key.clone(),
            prompt: prompt.to_string(),
            frames,
            seed: request.seed.unwrap_or(-1),
            image_urls,
            binary_data_base64,
        })
        .await?;

    let mut record = GenerationRecord::new(
        task_id.clone(),
        prompt,
        duration,
        fps,
        width,
        height,
        resolution.as_str(),
        version.as_str(),
        req_key.clone(),
    );
    record.seed = request.seed;
    record.first_frame_url = request.first_frame;
    record.last_frame_url = request.last_frame;

    // The task is already submitted; a failed history write must not fail it
    let warning = match state.history.create(&record).await {
        Ok(()) => None,
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Failed to persist generation record");
            Some("History is unavailable; this task will not appear in history".to_string())
        }
    };

    Ok(Json(GenerateResponse {
        task_id: task_id.to_string(),
        status: "pending".to_string(),
        req_key: req_key.to_string(),
        frames,
        warning,
    }))
}

/// Extract the base64 payload from a data URI, if `frame` is one.
fn data_uri_payload(frame: &str) -> Option<&str> {
    if !frame.starts_with("data:") {
        return None;
    }
    frame.split_once(',').map(|(_, payload)| payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_payload() {
        assert_eq!(
            data_uri_payload("data:image/png;base64,aGVsbG8="),
            Some("aGVsbG8=")
        );
        assert_eq!(data_uri_payload("https://img/first.png"), None);
        // Malformed data URI without a payload separator
        assert_eq!(data_uri_payload("data:image/png"), None);
    }
}
