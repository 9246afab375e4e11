//! Question validation and prompt rendering.

use std::fmt;

use thiserror::Error;

use crate::sanitizer::OFF_TOPIC_SENTINEL;
use crate::schema::SchemaDescription;

/// Longest question accepted, in characters.
pub const MAX_QUESTION_CHARS: usize = 500;

/// Why a question was refused before prompting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuestionError {
    #[error("question is empty")]
    Empty,
    #[error("question too long ({0} characters, max {max})", max = MAX_QUESTION_CHARS)]
    TooLong(usize),
}

/// A trimmed, non-empty, length-bounded user question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn parse(raw: &str) -> Result<Self, QuestionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QuestionError::Empty);
        }
        let chars = trimmed.chars().count();
        if chars > MAX_QUESTION_CHARS {
            return Err(QuestionError::TooLong(chars));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Renders the fixed instruction template around a question.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    schema_block: String,
}

impl PromptBuilder {
    pub fn new(schema: &SchemaDescription) -> Self {
        Self {
            schema_block: schema.render(),
        }
    }

    /// Build the prompt for `question`.
    ///
    /// The question is embedded as opaque text; this is not an injection
    /// boundary, the validator is.
    pub fn build(&self, question: &Question) -> Prompt {
        Prompt(format!(
            r#"You are a SQL expert. Convert this question to a PostgreSQL SELECT query.

DATABASE SCHEMA:
{schema}
RULES:
1. Return ONLY a single SELECT statement with no surrounding text, no explanation and no markdown.
2. Never generate INSERT, UPDATE, DELETE or any statement that changes data or schema.
3. Only use the tables and columns listed above.
4. For "how many" questions, use COUNT(*).
5. For "most recent", use ORDER BY created_at DESC LIMIT 1.
6. For technology searches, use ILIKE '%technology%' on tech_stack or description.
7. If the question cannot be answered from this schema, return exactly: {sentinel}

EXAMPLES:
Question: "How many projects?"
Answer: SELECT COUNT(*) FROM projects

Question: "Projects with Python?"
Answer: SELECT title, description FROM projects WHERE tech_stack ILIKE '%Python%' OR description ILIKE '%Python%'

Question: "Most recent project?"
Answer: SELECT title, description FROM projects ORDER BY created_at DESC LIMIT 1

Question: "What's the weather?"
Answer: {sentinel}

Now convert this question:
"{question}"

SQL Query:"#,
            schema = self.schema_block,
            sentinel = OFF_TOPIC_SENTINEL,
            question = question.as_str(),
        ))
    }
}
