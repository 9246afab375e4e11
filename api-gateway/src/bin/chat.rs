//! Chat Lambda - Answers natural-language questions about the portfolio.
//!
//! Endpoints:
//! - POST /chat - Generate, validate and run a read-only query for a question
//! - OPTIONS /chat - CORS preflight

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{chat_response, method_not_allowed, not_found, preflight_response};
use shared::{
    db, parse_body, resolve_generation_key, ChatGateway, ChatRequest, Config, GenerationClient,
    PgReadOnlyDatabase, QueryExecutor, PORTFOLIO_SCHEMA,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    gateway: ChatGateway,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;

        // Missing credential is fatal here rather than on the first request
        let key_source = config.require_generation_key()?;
        let api_key = resolve_generation_key(key_source).await?;
        let generator = GenerationClient::gemini(api_key, &config.generation)?;

        let options = db::connect_options(&config).await?;
        let pool = db::create_read_only_pool(options).await?;
        let executor = QueryExecutor::new(Arc::new(PgReadOnlyDatabase::new(pool)), config.query);

        info!(
            model = %config.generation.model,
            max_attempts = generator.policy().max_attempts,
            row_limit = config.query.row_limit,
            "Chat gateway ready"
        );

        Ok(Self {
            gateway: ChatGateway::new(PORTFOLIO_SCHEMA, generator, executor),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={} (raw: {})", method, path, raw_path);

    match (method, path) {
        ("POST", "/chat") => {
            let request: ChatRequest = parse_body!(event.body());
            chat_response(state.gateway.answer(&request.question).await)
        }
        ("OPTIONS", "/chat") => preflight_response(),
        (_, "/chat") => method_not_allowed(),
        _ => not_found(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
