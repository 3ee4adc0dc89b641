//! Defines the HTTP surface of the ingest endpoint.
//!
//! ## Structure
//! - `GET  /healthz` — liveness
//! - `GET  /readyz`  — readiness (temp/mirror directories writable)
//! - `POST /upload`  — multipart image upload (`image` part + metadata fields)

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::upload_image,
    },
    services::ingest_service::IngestService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build and return the router for the ingest endpoint.
///
/// The router carries shared state (`IngestService`) to all handlers.
/// `max_upload_bytes` caps the size of a whole multipart request.
pub fn routes(max_upload_bytes: usize) -> Router<IngestService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
