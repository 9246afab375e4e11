//! Client for the external text-generation service.
//!
//! [`GenerationBackend`] performs one remote attempt. [`GenerationClient`]
//! wraps a backend with the per-attempt timeout, the retry policy and the
//! per-attempt log records, and reduces everything to a
//! [`GenerationOutcome`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GenerationSettings;
use crate::prompt::{Prompt, Question};
use crate::{Error, Result};

/// Longest upstream error body kept for logs.
const MAX_ERROR_BODY: usize = 500;

/// Classified reason a generation call did not produce text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No credential configured
    ConfigMissing,
    /// Timeout, network error, 5xx or rate limiting; retried
    Transient,
    /// Rejected request or credential; not retried
    Permanent,
    /// Service answered but no text could be extracted
    MalformedResponse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::ConfigMissing => "config_missing",
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::MalformedResponse => "malformed_response",
        })
    }
}

/// Result of asking the service for SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    RawText(String),
    UpstreamFailure { kind: FailureKind, detail: String },
}

/// Failure of a single remote attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AttemptError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AttemptError::MissingCredential => FailureKind::ConfigMissing,
            AttemptError::Timeout | AttemptError::Network(_) => FailureKind::Transient,
            AttemptError::Status { status, .. } if *status >= 500 || *status == 408 || *status == 429 => {
                FailureKind::Transient
            }
            AttemptError::Status { .. } => FailureKind::Permanent,
            AttemptError::Malformed(_) => FailureKind::MalformedResponse,
        }
    }
}

/// One remote text-generation attempt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, AttemptError>;
}

/// Timeout and retry budget for generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(6);
        self.backoff_base.saturating_mul(1 << exp)
    }
}

impl From<&GenerationSettings> for RetryPolicy {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            request_timeout: settings.request_timeout,
            backoff_base: settings.backoff_base,
        }
    }
}

/// Retrying, timeout-bounded generation client.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    policy: RetryPolicy,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Client backed by Gemini, built once at start-up.
    pub fn gemini(api_key: String, settings: &GenerationSettings) -> Result<Self> {
        let backend = GeminiBackend::new(api_key, settings)?;
        Ok(Self::new(Arc::new(backend), RetryPolicy::from(settings)))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Ask for SQL, retrying transient failures with exponential backoff.
    pub async fn generate(&self, question: &Question, prompt: &Prompt) -> GenerationOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(
                self.policy.request_timeout,
                self.backend.complete(prompt.as_str()),
            )
            .await
            .unwrap_or(Err(AttemptError::Timeout));

            match result {
                Ok(text) => {
                    info!(question = %question, attempt, outcome = "ok", "Generation attempt succeeded");
                    return GenerationOutcome::RawText(text);
                }
                Err(err) => {
                    let kind = err.kind();
                    let will_retry = kind == FailureKind::Transient && attempt < self.policy.max_attempts;
                    warn!(
                        question = %question,
                        attempt,
                        outcome = %kind,
                        error = %err,
                        will_retry,
                        "Generation attempt failed"
                    );
                    if !will_retry {
                        return GenerationOutcome::UpstreamFailure {
                            kind,
                            detail: format!("{} (attempt {})", err, attempt),
                        };
                    }
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

/// Google Gemini `generateContent` over HTTPS.
pub struct GeminiBackend {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, settings: &GenerationSettings) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("generation API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: format!(
                "{}/models/{}:generateContent",
                settings.endpoint.trim_end_matches('/'),
                settings.model
            ),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, AttemptError> {
        if self.api_key.is_empty() {
            return Err(AttemptError::MissingCredential);
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiRequestPart { text: prompt }],
            }],
        };

        let response = self
            .http_client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Timeout
            } else {
                AttemptError::Malformed(e.to_string())
            }
        })?;

        parsed
            .into_text()
            .ok_or_else(|| AttemptError::Malformed("response contained no candidate text".to_string()))
    }
}

fn classify_transport_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout
    } else {
        AttemptError::Network(e.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::schema::PORTFOLIO_SCHEMA;
    use crate::testing::ScriptedBackend;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Never answers within the policy timeout.
    struct HangingBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerationBackend for HangingBackend {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("SELECT 1".to_string())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            request_timeout: Duration::from_millis(50),
            backoff_base: Duration::from_millis(1),
        }
    }

    fn question_and_prompt() -> (Question, Prompt) {
        let question = Question::parse("How many projects?").unwrap();
        let prompt = PromptBuilder::new(&PORTFOLIO_SCHEMA).build(&question);
        (question, prompt)
    }

    fn server_error() -> std::result::Result<String, AttemptError> {
        Err(AttemptError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let backend = ScriptedBackend::new(vec![Ok("SELECT COUNT(*) FROM projects".to_string())]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let (q, p) = question_and_prompt();

        let outcome = client.generate(&q, &p).await;

        assert_eq!(
            outcome,
            GenerationOutcome::RawText("SELECT COUNT(*) FROM projects".to_string())
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = ScriptedBackend::new(vec![
            server_error(),
            Err(AttemptError::Network("connection reset".to_string())),
            Ok("SELECT id FROM projects".to_string()),
        ]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let (q, p) = question_and_prompt();

        let outcome = client.generate(&q, &p).await;

        assert_eq!(outcome, GenerationOutcome::RawText("SELECT id FROM projects".to_string()));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_capped() {
        let backend = ScriptedBackend::new(vec![server_error()]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let (q, p) = question_and_prompt();

        let outcome = client.generate(&q, &p).await;

        assert!(matches!(
            outcome,
            GenerationOutcome::UpstreamFailure { kind: FailureKind::Transient, .. }
        ));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(AttemptError::Status {
            status: 403,
            body: "API key not valid".to_string(),
        })]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let (q, p) = question_and_prompt();

        let outcome = client.generate(&q, &p).await;

        assert!(matches!(
            outcome,
            GenerationOutcome::UpstreamFailure { kind: FailureKind::Permanent, .. }
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_missing_credential_are_not_retried() {
        for (err, kind) in [
            (AttemptError::Malformed("no text".to_string()), FailureKind::MalformedResponse),
            (AttemptError::MissingCredential, FailureKind::ConfigMissing),
        ] {
            let backend = ScriptedBackend::new(vec![Err(err)]);
            let client = GenerationClient::new(backend.clone(), fast_policy());
            let (q, p) = question_and_prompt();

            match client.generate(&q, &p).await {
                GenerationOutcome::UpstreamFailure { kind: got, .. } => assert_eq!(got, kind),
                other => panic!("unexpected outcome {:?}", other),
            }
            assert_eq!(backend.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_each_attempt_is_bounded_by_timeout() {
        let backend = Arc::new(HangingBackend {
            calls: AtomicU32::new(0),
        });
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let (q, p) = question_and_prompt();

        let started = std::time::Instant::now();
        let outcome = client.generate(&q, &p).await;

        match outcome {
            GenerationOutcome::UpstreamFailure { kind, detail } => {
                assert_eq!(kind, FailureKind::Transient);
                assert!(detail.contains("timed out"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_status_classification() {
        let status = |status| AttemptError::Status {
            status,
            body: String::new(),
        };
        assert_eq!(status(500).kind(), FailureKind::Transient);
        assert_eq!(status(503).kind(), FailureKind::Transient);
        assert_eq!(status(429).kind(), FailureKind::Transient);
        assert_eq!(status(400).kind(), FailureKind::Permanent);
        assert_eq!(status(401).kind(), FailureKind::Permanent);
        assert_eq!(AttemptError::Timeout.kind(), FailureKind::Transient);
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy {
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(250),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_gemini_backend_requires_key() {
        let settings = GenerationSettings::default();
        assert!(matches!(
            GeminiBackend::new("  ".to_string(), &settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_gemini_response_text_extraction() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"```sql\n"},{"text":"SELECT 1\n```"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("```sql\nSELECT 1\n```"));

        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(blocked.into_text(), None);
    }
}
