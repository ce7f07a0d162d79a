//! API Handlers Module
//!
//! This module contains the request handlers for the API system.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use jobscan::{Manager, QueryParams};

use crate::models::ErrorResponse;

/// Prefix of the storage error raised for a malformed glob
const INVALID_GLOB_PREFIX: &str = "invalid glob pattern";

/// Represents the state of the API server
pub struct ApiState {
    /// Query manager; `None` when no artifact storage is configured
    pub manager: Option<Arc<Manager>>,
}

/// Health check endpoint
#[debug_handler]
pub async fn health_check() -> Json<HashMap<String, String>> {
    let mut response = HashMap::new();
    response.insert("status".to_string(), "healthy".to_string());
    response.insert("service".to_string(), "jobscan-api".to_string());
    Json(response)
}

/// Query job-run artifacts
///
/// Partial failure is still a 200: per-job-run errors are part of the
/// response body. The one exception is a glob every job run rejected,
/// which is the caller's mistake and reported as a 400.
#[debug_handler]
pub async fn query_job_artifacts(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<QueryParams>,
) -> Response {
    let Some(manager) = state.manager.as_ref() else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "APIConfigError",
            "",
            "server not configured for artifact storage, unable to use this API",
        );
    };

    let query = match params.to_query() {
        Ok(query) => query,
        Err(e) => {
            return failure(StatusCode::BAD_REQUEST, e.error_type(), e.param(), e.to_string());
        }
    };
    tracing::debug!(job_runs = query.job_run_ids.len(), "querying job artifacts");

    let response = manager.query(query).await;
    if response.job_runs.is_empty() {
        if let Some(first) = response.errors.first() {
            if first.error.starts_with(INVALID_GLOB_PREFIX) {
                return failure(
                    StatusCode::BAD_REQUEST,
                    "ParameterInvalid",
                    "pathGlob",
                    format!("invalid pattern according to {}", first.error),
                );
            }
        }
    }

    (StatusCode::OK, Json(response)).into_response()
}

fn failure(status: StatusCode, error_type: &str, param: &str, message: impl Into<String>) -> Response {
    let body = ErrorResponse::new(status.as_u16(), error_type, param, message);
    (status, Json(body)).into_response()
}
