//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the metadata backend answers queries

use crate::{
    adapters::ScanRange,
    models::object::{IterateCursor, ObjectStatus},
    services::cancellable,
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that runs a one-row range scan against the backend.
/// HTTP 200 when it succeeds, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let probe = ScanRange {
        project_id: Uuid::nil(),
        bucket_name: String::new(),
        status: ObjectStatus::Pending,
        seek: IterateCursor::default(),
        upper_bound: None,
        limit: 1,
    };

    let token = state.request_token();
    let backend_check =
        match cancellable(&token, state.metabase.adapter().scan_range(&probe)).await {
            Ok(_) => (true, None::<String>),
            Err(e) => (false, Some(format!("error: {}", e))),
        };

    let overall_ok = backend_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "backend",
        CheckStatus {
            ok: backend_check.0,
            error: backend_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
