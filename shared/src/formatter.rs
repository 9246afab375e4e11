//! Rendering of query results and rejections into chat responses.

use serde_json::Value;

use crate::executor::QueryResult;
use crate::models::{ChatErrorCode, ChatResponse};
use crate::prompt::{QuestionError, MAX_QUESTION_CHARS};
use crate::validator::ApprovedSql;

pub const NO_RESULTS_MESSAGE: &str = "No matching results found.";
pub const OFF_TOPIC_MESSAGE: &str =
    "I can only answer questions about the projects in this portfolio.";
pub const NOT_SQL_MESSAGE: &str =
    "I couldn't turn that question into a query. Try rephrasing it.";
pub const UNSAFE_MESSAGE: &str = "That question led to a query I'm not allowed to run.";
pub const EXECUTION_MESSAGE: &str =
    "I could not run that query. Try rephrasing your question.";

/// Render rows in executor order, with the executed SQL for transparency.
pub fn format_result(sql: &ApprovedSql, result: &QueryResult) -> ChatResponse {
    ChatResponse {
        answer_text: render_rows(result),
        executed_sql: Some(sql.as_str().to_string()),
        error_code: None,
    }
}

/// Why a request was answered without running a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidQuestion(QuestionError),
    OffTopic,
    NotSql,
    Unsafe,
    Execution,
}

/// Fixed, user-safe message for a rejection.
///
/// Generated SQL and database errors are never part of the message.
pub fn format_rejection(reason: &Rejection) -> ChatResponse {
    match reason {
        Rejection::InvalidQuestion(QuestionError::Empty) => rejection(
            ChatErrorCode::InvalidQuestion,
            "Please ask a question about the portfolio.".to_string(),
        ),
        Rejection::InvalidQuestion(QuestionError::TooLong(_)) => rejection(
            ChatErrorCode::InvalidQuestion,
            format!(
                "That question is too long. Please keep it under {} characters.",
                MAX_QUESTION_CHARS
            ),
        ),
        Rejection::OffTopic => rejection(ChatErrorCode::OffTopic, OFF_TOPIC_MESSAGE.to_string()),
        Rejection::NotSql => rejection(ChatErrorCode::NotSql, NOT_SQL_MESSAGE.to_string()),
        Rejection::Unsafe => rejection(ChatErrorCode::UnsafeQuery, UNSAFE_MESSAGE.to_string()),
        Rejection::Execution => {
            rejection(ChatErrorCode::ExecutionError, EXECUTION_MESSAGE.to_string())
        }
    }
}

fn rejection(code: ChatErrorCode, message: String) -> ChatResponse {
    ChatResponse {
        answer_text: message,
        executed_sql: None,
        error_code: Some(code),
    }
}

fn render_rows(result: &QueryResult) -> String {
    let count = result.rows.len();
    if count == 0 {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let mut out = format!("Found {} row{}", count, if count == 1 { "" } else { "s" });
    if result.truncated {
        out.push_str(&format!(" (showing the first {})", count));
    }
    out.push(':');

    for (i, row) in result.rows.iter().enumerate() {
        let cells: Vec<String> = row
            .columns()
            .iter()
            .map(|(name, value)| format!("{}: {}", name, render_value(value)))
            .collect();
        out.push_str(&format!("\n{}. {}", i + 1, cells.join(", ")));
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
