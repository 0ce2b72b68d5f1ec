//! Task status polling handler.

use axum::extract::{Path, State};
use axum::Json;

use vgen_models::{StatusReport, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Poll the status of a generation task.
///
/// Each poll runs one reconciliation cycle: timeout check, candidate key
/// probing, and persistence of any confirmed transition.
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusReport>> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(ApiError::bad_request("task_id must not be empty"));
    }

    let report = state.reconciler.reconcile(&TaskId::from(task_id)).await;
    Ok(Json(report))
}
