//! The chat pipeline: question in, formatted answer out.
//!
//! Every request moves forward through the same stages and stops at the
//! first rejection. Nothing loops back to generation after a rejection.

use std::fmt;

use tracing::{error, info, warn};

use crate::executor::QueryExecutor;
use crate::formatter::{format_rejection, format_result, Rejection};
use crate::generation::{FailureKind, GenerationClient, GenerationOutcome};
use crate::models::ChatResponse;
use crate::prompt::{PromptBuilder, Question};
use crate::sanitizer::sanitize;
use crate::schema::SchemaDescription;
use crate::validator::{SqlValidator, Verdict};
use crate::{Error, Result};

/// Where a request is in the pipeline; logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Prompted,
    Generated,
    Sanitized,
    Validated,
    Executed,
    Rejected,
    Answered,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Received => "received",
            Stage::Prompted => "prompted",
            Stage::Generated => "generated",
            Stage::Sanitized => "sanitized",
            Stage::Validated => "validated",
            Stage::Executed => "executed",
            Stage::Rejected => "rejected",
            Stage::Answered => "answered",
            Stage::Failed => "failed",
        })
    }
}

/// Turns one natural-language question into one chat response.
///
/// Holds no per-request state, so a single instance serves concurrent
/// requests.
#[derive(Clone)]
pub struct ChatGateway {
    prompts: PromptBuilder,
    generator: GenerationClient,
    validator: SqlValidator,
    executor: QueryExecutor,
}

impl ChatGateway {
    pub fn new(schema: SchemaDescription, generator: GenerationClient, executor: QueryExecutor) -> Self {
        Self {
            prompts: PromptBuilder::new(&schema),
            generator,
            validator: SqlValidator::new(schema),
            executor,
        }
    }

    /// Answer a question.
    ///
    /// Rejections are ordinary answers. Only an upstream generation failure
    /// that cannot be reported as a rejection comes back as `Err`.
    pub async fn answer(&self, raw_question: &str) -> Result<ChatResponse> {
        info!(stage = %Stage::Received, chars = raw_question.chars().count());

        let question = match Question::parse(raw_question) {
            Ok(q) => q,
            Err(e) => {
                info!(stage = %Stage::Rejected, reason = %e, "Question rejected");
                return Ok(format_rejection(&Rejection::InvalidQuestion(e)));
            }
        };

        let prompt = self.prompts.build(&question);
        info!(stage = %Stage::Prompted, question = %question);

        let raw = match self.generator.generate(&question, &prompt).await {
            GenerationOutcome::RawText(text) => text,
            GenerationOutcome::UpstreamFailure {
                kind: FailureKind::MalformedResponse,
                detail,
            } => {
                warn!(stage = %Stage::Rejected, question = %question, detail = %detail, "No usable text in generation response");
                return Ok(format_rejection(&Rejection::NotSql));
            }
            GenerationOutcome::UpstreamFailure { kind, detail } => {
                error!(stage = %Stage::Failed, question = %question, kind = %kind, detail = %detail, "Generation failed");
                return Err(Error::Upstream { kind, detail });
            }
        };
        info!(stage = %Stage::Generated, question = %question, raw = %raw);

        let sanitized = sanitize(&raw);
        info!(stage = %Stage::Sanitized, question = %question, text = ?sanitized);

        let verdict = self.validator.validate(&sanitized);
        info!(stage = %Stage::Validated, question = %question, verdict = verdict.label());

        let sql = match verdict {
            Verdict::Valid(sql) => sql,
            Verdict::InvalidOffTopic => {
                info!(stage = %Stage::Rejected, question = %question, "Question is off-topic");
                return Ok(format_rejection(&Rejection::OffTopic));
            }
            Verdict::InvalidNotSql(reason) => {
                warn!(stage = %Stage::Rejected, question = %question, reason = %reason, "Generated text is not usable SQL");
                return Ok(format_rejection(&Rejection::NotSql));
            }
            Verdict::InvalidUnsafe(reason) => {
                warn!(stage = %Stage::Rejected, question = %question, reason = %reason, "Generated SQL blocked");
                return Ok(format_rejection(&Rejection::Unsafe));
            }
        };

        match self.executor.execute(&sql).await {
            Ok(result) => {
                info!(
                    stage = %Stage::Executed,
                    question = %question,
                    sql = %sql,
                    rows = result.rows.len(),
                    truncated = result.truncated
                );
                let response = format_result(&sql, &result);
                info!(stage = %Stage::Answered, question = %question);
                Ok(response)
            }
            Err(e) => {
                error!(stage = %Stage::Rejected, question = %question, sql = %sql, error = %e, "Query execution failed");
                Ok(format_rejection(&Rejection::Execution))
            }
        }
    }
}
