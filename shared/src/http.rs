//! HTTP helpers for Lambda functions.

use lambda_http::{Body, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::models::ChatResponse;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// Error body returned for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn builder(status: u16) -> lambda_http::http::response::Builder {
    Response::builder()
        .status(status)
        .header("access-control-allow-origin", ALLOW_ORIGIN)
        .header("access-control-allow-methods", ALLOW_METHODS)
        .header("access-control-allow-headers", ALLOW_HEADERS)
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    Ok(builder(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ErrorBody { error: message.into() })
}

/// Map a shared error onto its status code and caller-safe message.
pub fn error_to_response(err: &crate::Error) -> Result<Response<Body>, lambda_http::Error> {
    if err.status_code() >= 500 {
        error!(error = %err, "Request failed");
    }
    error_response(err.status_code(), err.public_message())
}

/// Empty 204 answer to a CORS preflight.
pub fn preflight_response() -> Result<Response<Body>, lambda_http::Error> {
    Ok(builder(204).body(Body::Empty)?)
}

pub fn not_found() -> Result<Response<Body>, lambda_http::Error> {
    error_response(404, "Endpoint not found")
}

pub fn method_not_allowed() -> Result<Response<Body>, lambda_http::Error> {
    error_response(405, "Method not allowed")
}

/// Chat answers, including rejections, are 200; gateway errors use their status.
pub fn chat_response(result: crate::Result<ChatResponse>) -> Result<Response<Body>, lambda_http::Error> {
    match result {
        Ok(response) => json_response(200, &response),
        Err(err) => error_to_response(&err),
    }
}

/// Parse request body as JSON, returning a 400 response on failure.
///
/// Returns `Ok(Ok(T))` on successful parse, `Ok(Err(Response))` on parse error (400),
/// or `Err(lambda_http::Error)` on serialization failure.
pub fn parse_json_body<T: DeserializeOwned>(body: &Body) -> Result<Result<T, Response<Body>>, lambda_http::Error> {
    match serde_json::from_slice(body.as_ref()) {
        Ok(parsed) => Ok(Ok(parsed)),
        Err(e) => {
            let response = error_response(400, format!("Invalid request body: {}", e))?;
            Ok(Err(response))
        }
    }
}

/// Macro to parse request body, returning early with 400 on parse error.
///
/// Usage:
/// ```ignore
/// let request: MyRequest = parse_body!(event.body());
/// ```
#[macro_export]
macro_rules! parse_body {
    ($body:expr) => {
        match shared::http::parse_json_body($body)? {
            Ok(parsed) => parsed,
            Err(response) => return Ok(response),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::FailureKind;
    use crate::models::{ChatErrorCode, ChatRequest};

    fn body_json(response: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(response.body().as_ref()).unwrap()
    }

    #[test]
    fn test_responses_carry_cors_headers() {
        let response = json_response(200, &serde_json::json!({"status": "ok"})).unwrap();
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["content-type"], "application/json");

        let preflight = preflight_response().unwrap();
        assert_eq!(preflight.status(), 204);
        assert_eq!(preflight.headers()["access-control-allow-headers"], "Content-Type");
    }

    #[test]
    fn test_rejection_is_200() {
        let response = chat_response(Ok(ChatResponse {
            answer_text: "no".to_string(),
            executed_sql: None,
            error_code: Some(ChatErrorCode::OffTopic),
        }))
        .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response)["error_code"], "off_topic");
    }

    #[test]
    fn test_upstream_failure_is_500_without_detail() {
        let response = chat_response(Err(crate::Error::Upstream {
            kind: FailureKind::Transient,
            detail: "request timed out (attempt 3)".to_string(),
        }))
        .unwrap();
        assert_eq!(response.status(), 500);
        let body = body_json(&response);
        assert!(!body["error"].as_str().unwrap().contains("attempt"));
    }

    #[test]
    fn test_not_found_and_method_not_allowed() {
        assert_eq!(body_json(&not_found().unwrap())["error"], "Endpoint not found");
        assert_eq!(method_not_allowed().unwrap().status(), 405);
    }

    #[test]
    fn test_parse_json_body() {
        let ok: ChatRequest = parse_json_body(&Body::from(r#"{"question":"How many?"}"#))
            .unwrap()
            .unwrap();
        assert_eq!(ok.question, "How many?");

        let bad = parse_json_body::<ChatRequest>(&Body::from("not json")).unwrap().unwrap_err();
        assert_eq!(bad.status(), 400);
    }
}
