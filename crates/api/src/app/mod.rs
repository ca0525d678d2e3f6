//! HTTP API application wiring (Axum router + service state).
//!
//! - `services.rs`: the shared state handed to every handler
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use medchain_infra::Runtime;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router over an assembled runtime.
pub fn build_app(runtime: Arc<Runtime>) -> Router {
    let services = Arc::new(services::AppServices::new(runtime));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
