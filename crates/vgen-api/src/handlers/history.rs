//! Generation history handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use vgen_history::HistoryQuery;
use vgen_models::{GenerationRecord, GenerationStatus, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// List history query params.
#[derive(Debug, Deserialize)]
pub struct ListHistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub status: Option<String>,
}

/// History list response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: u64,
    pub items: Vec<GenerationRecord>,
}

/// List generation history, newest first.
///
/// Sweeps timed-out tasks first so listings never show active records that
/// are past their deadline. A degraded store yields an empty page rather
/// than an error.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<ListHistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            GenerationStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{s}'")))
        })
        .transpose()?;

    if let Err(e) = state.history.sweep_timed_out(state.config.task_timeout()).await {
        warn!(error = %e, "Pre-listing sweep failed");
    }

    let history_query = HistoryQuery {
        limit: normalize_limit(query.limit),
        offset: query.offset.unwrap_or(0),
        status,
    };

    match state.history.list(&history_query).await {
        Ok(page) => Ok(Json(HistoryResponse {
            total: page.total,
            items: page.items,
        })),
        Err(e) => {
            warn!(error = %e, "History listing unavailable");
            Ok(Json(HistoryResponse {
                total: 0,
                items: vec![],
            }))
        }
    }
}

/// Fetch a single history record.
pub async fn get_history_item(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<GenerationRecord>> {
    let record = state
        .history
        .get(&TaskId::from(task_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No record for task {task_id}")))?;

    Ok(Json(record))
}

/// Delete a history record.
pub async fn delete_history_item(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state.history.delete(&TaskId::from(task_id.as_str())).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("No record for task {task_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn normalize_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => DEFAULT_PAGE_SIZE,
        Some(l) if l > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        Some(l) => l,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_limit() {
        assert_eq!(normalize_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(normalize_limit(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(normalize_limit(Some(50)), 50);
        assert_eq!(normalize_limit(Some(500)), MAX_PAGE_SIZE);
    }
}
