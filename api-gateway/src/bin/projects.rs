//! Projects Lambda - Lists and creates portfolio projects.
//!
//! Endpoints:
//! - GET /projects - List projects, newest first
//! - POST /projects - Create a project
//! - OPTIONS /projects - CORS preflight

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_to_response, json_response, method_not_allowed, not_found, preflight_response};
use shared::{db, parse_body, Config, CreateProjectRequest, NewProject, Project};
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
        info!("Database schema ready");

        Ok(Self { db_pool })
    }
}

async fn list_projects(pool: &PgPool) -> shared::Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT id, title, description, tech_stack, github_url FROM projects ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(projects)
}

async fn create_project(pool: &PgPool, project: &NewProject) -> shared::Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO projects (title, description, tech_stack, github_url)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&project.title)
    .bind(&project.description)
    .bind(&project.tech_stack)
    .bind(&project.github_url)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    let method = event.method().as_str();

    info!("Received request: method={}, path={} (raw: {})", method, path, raw_path);

    match (method, path) {
        ("GET", "/projects") => match list_projects(&state.db_pool).await {
            Ok(projects) => json_response(200, &serde_json::json!({ "projects": projects })),
            Err(e) => {
                error!("Failed to list projects: {}", e);
                error_to_response(&e)
            }
        },

        ("POST", "/projects") => {
            let request: CreateProjectRequest = parse_body!(event.body());
            let project = match NewProject::try_from(request) {
                Ok(project) => project,
                Err(e) => return error_to_response(&e),
            };

            match create_project(&state.db_pool, &project).await {
                Ok(project_id) => {
                    info!("Created project {} ({})", project.title, project_id);
                    json_response(
                        201,
                        &serde_json::json!({
                            "message": "Project created successfully",
                            "project_id": project_id,
                        }),
                    )
                }
                Err(e) => {
                    error!("Failed to create project: {}", e);
                    error_to_response(&e)
                }
            }
        }

        ("OPTIONS", "/projects") => preflight_response(),
        (_, "/projects") => method_not_allowed(),
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
