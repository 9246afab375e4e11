//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Chat request payload.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// Machine-readable reason a chat request was answered without results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorCode {
    InvalidQuestion,
    OffTopic,
    NotSql,
    UnsafeQuery,
    ExecutionError,
}

/// The only object returned to chat callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "answer")]
    pub answer_text: String,
    /// Present only when a statement was executed
    #[serde(rename = "sql")]
    pub executed_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ChatErrorCode>,
}

/// Project row as listed by `GET /api/projects`.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub tech_stack: String,
    pub github_url: Option<String>,
}

/// Create-project payload.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tech_stack: Option<String>,
    pub github_url: Option<String>,
}

/// Trimmed and validated project fields.
#[derive(Debug, Validate)]
pub struct NewProject {
    #[validate(length(max = 200, message = "Title too long (max 200 characters)"))]
    pub title: String,
    #[validate(length(max = 2000, message = "Description too long (max 2000 characters)"))]
    pub description: String,
    #[validate(length(max = 300, message = "Tech stack too long (max 300 characters)"))]
    pub tech_stack: String,
    #[validate(
        url(message = "Invalid GitHub URL"),
        length(max = 300, message = "GitHub URL too long (max 300 characters)")
    )]
    pub github_url: Option<String>,
}

impl TryFrom<CreateProjectRequest> for NewProject {
    type Error = crate::Error;

    fn try_from(request: CreateProjectRequest) -> crate::Result<Self> {
        let project = Self {
            title: required("title", request.title)?,
            description: required("description", request.description)?,
            tech_stack: required("tech_stack", request.tech_stack)?,
            github_url: optional(request.github_url),
        };
        if let Some(url) = &project.github_url {
            if !url.starts_with("http") {
                return Err(crate::Error::Validation("Invalid GitHub URL".to_string()));
            }
        }
        project.validate().map_err(first_validation_message)?;
        Ok(project)
    }
}

/// Contact-form payload.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
}

/// Trimmed and validated contact submission.
#[derive(Debug, Validate)]
pub struct NewContact {
    #[validate(length(max = 100, message = "Name too long (max 100 characters)"))]
    pub name: String,
    #[validate(
        length(max = 100, message = "Email too long (max 100 characters)"),
        email(message = "Invalid email format")
    )]
    pub email: String,
    #[validate(length(max = 1000, message = "Message too long (max 1000 characters)"))]
    pub message: String,
}

impl TryFrom<ContactRequest> for NewContact {
    type Error = crate::Error;

    fn try_from(request: ContactRequest) -> crate::Result<Self> {
        let contact = Self {
            name: required("name", request.name)?,
            email: required("email", request.email)?,
            message: required("message", request.message)?,
        };
        contact.validate().map_err(first_validation_message)?;
        Ok(contact)
    }
}

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

fn required(field: &str, value: Option<String>) -> crate::Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(crate::Error::Validation(format!("Missing required field: {}", field))),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_validation_message(errors: validator::ValidationErrors) -> crate::Error {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let message = fields
        .into_iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Invalid request".to_string());
    crate::Error::Validation(message)
}
