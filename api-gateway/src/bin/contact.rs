//! Contact Lambda - Stores contact-form submissions.
//!
//! Endpoints:
//! - POST /contact - Submit a message
//! - OPTIONS /contact - CORS preflight

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_to_response, json_response, method_not_allowed, not_found, preflight_response};
use shared::{db, parse_body, Config, ContactRequest, NewContact};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    db_pool: PgPool,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let options = db::connect_options(&config).await?;
        let db_pool = db::create_pool(options).await?;

        db::init_schema(&db_pool).await?;

        Ok(Self { db_pool })
    }
}

async fn save_contact(pool: &PgPool, contact: &NewContact) -> shared::Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO contacts (name, email, message) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&contact.name)
    .bind(&contact.email)
    .bind(&contact.message)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

fn submitted_body(contact_id: i32) -> serde_json::Value {
    serde_json::json!({
        "message": "Contact form submitted successfully",
        "contact_id": contact_id,
    })
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={} (raw: {})", method, path, raw_path);

    match (method, path) {
        ("POST", "/contact") => {
            let request: ContactRequest = parse_body!(event.body());
            let contact = match NewContact::try_from(request) {
                Ok(contact) => contact,
                Err(e) => return error_to_response(&e),
            };

            match save_contact(&state.db_pool, &contact).await {
                Ok(contact_id) => {
                    info!("Stored contact submission {}", contact_id);
                    json_response(201, &submitted_body(contact_id))
                }
                Err(e) => {
                    error!("Failed to store contact submission: {}", e);
                    error_to_response(&e)
                }
            }
        }

        ("OPTIONS", "/contact") => preflight_response(),
        (_, "/contact") => method_not_allowed(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submitted_body() {
        let body = submitted_body(42);
        assert_eq!(body["message"], "Contact form submitted successfully");
        assert_eq!(body["contact_id"], 42);
    }
}
