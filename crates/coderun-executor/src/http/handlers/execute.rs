//! Task execution handler.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use coderun_core::{CoreError, ErrorKind, TaskRequest};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::http::responses::ApiError;
use crate::state::AppState;

/// Execute one task and return its result envelope.
///
/// Body: `{ "task": string, "contextId": string, "taskId"?: string }`.
/// Validation failures are 400; admission failures are 500. Everything that
/// happens during execution is reported in a 200 envelope.
pub async fn execute_task(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                error_kind = %ErrorKind::InvalidRequest,
                error = %e,
                detail = e.detail().unwrap_or_default(),
                "Rejected execute request"
            );
            return ApiError::bad_request(e.to_string()).into_response();
        }
    };

    info!(
        context_id = %request.context_id,
        task_id = ?request.task_id.as_ref().map(|id| id.as_str()),
        task = %request.preview(60),
        "Received task"
    );

    match state.admission.submit(request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(error_kind = %ErrorKind::InternalFault, error = %e, "Task could not be admitted");
            ApiError::internal(e.to_string()).into_response()
        }
    }
}

fn parse_request(body: &[u8]) -> Result<TaskRequest, CoreError> {
    let fields = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        _ => return Err(CoreError::InvalidBody),
    };

    let task_id = fields.get("taskId");
    let request = TaskRequest::from_parts(
        string_field(&fields, "task"),
        string_field(&fields, "contextId"),
        string_field(&fields, "taskId"),
    )?;

    // A present, non-null taskId must be a string.
    if matches!(task_id, Some(v) if !v.is_null() && !v.is_string()) {
        return Err(CoreError::InvalidField {
            field: "taskId",
            reason: "must be a string".to_string(),
        });
    }

    Ok(request)
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_owned)
}
