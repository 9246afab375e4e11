//! Health Lambda - Liveness probe for the API.
//!
//! Endpoints:
//! - GET /health - Report service status

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{json_response, method_not_allowed, not_found, preflight_response};
use shared::HealthResponse;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn handler(event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={} (raw: {})", method, path, raw_path);

    match (method, path) {
        ("GET", "/health") => json_response(
            200,
            &HealthResponse {
                status: "healthy",
                timestamp: Utc::now(),
            },
        ),
        ("OPTIONS", "/health") => preflight_response(),
        (_, "/health") => method_not_allowed(),
        _ => not_found(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    run(service_fn(handler)).await
}
