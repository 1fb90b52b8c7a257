//! Defines routes for the object metadata service.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz` — liveness
//!   - `GET  /readyz`  — backend readiness
//!
//! - **Objects**
//!   - `GET  /projects/{project_id}/buckets/{bucket}/objects` — list objects
//!     (supports prefix, status, cursor, recursive, max_keys)
//!   - `POST /projects/{project_id}/buckets/{bucket}/objects/{*key}` — begin
//!     an object with the next version
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{begin_object, list_objects},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all service routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/projects/{project_id}/buckets/{bucket}/objects",
            get(list_objects),
        )
        .route(
            "/projects/{project_id}/buckets/{bucket}/objects/{*key}",
            post(begin_object),
        )
}
