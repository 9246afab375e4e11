//! Cleanup of raw generator output.
//!
//! Only the textual shape is handled here: code fences, leading answer
//! markers and the off-topic sentinel. SQL semantics belong to
//! [`crate::validator`].

/// Literal the generator is told to return for unanswerable questions.
pub const OFF_TOPIC_SENTINEL: &str = "INVALID";

const FENCE: &str = "```";

const LANGUAGE_TAGS: &[&str] = &[
    "sql", "postgresql", "postgres", "pgsql", "psql", "plsql", "sqlite", "mysql", "text",
];

const LEADING_MARKERS: &[&str] = &["SQL Query:", "SQL:", "Query:", "Answer:"];

/// Generator output after cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizedText {
    /// Candidate SQL, not yet validated
    Sql(String),
    /// The generator declared the question unanswerable
    OffTopic,
}

/// Clean raw generator text into a candidate statement or the sentinel.
pub fn sanitize(raw: &str) -> SanitizedText {
    let text = strip_fence(raw.trim()).trim();
    let text = strip_leading_marker(text).trim();

    if text.eq_ignore_ascii_case(OFF_TOPIC_SENTINEL) {
        SanitizedText::OffTopic
    } else {
        SanitizedText::Sql(text.to_string())
    }
}

/// Keep only the interior of the first fenced block, if there is one.
fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find(FENCE) else {
        return text;
    };
    let after_open = &text[open + FENCE.len()..];
    let body = match after_open.find(FENCE) {
        Some(close) => &after_open[..close],
        None => after_open,
    };
    strip_language_tag(body)
}

fn strip_language_tag(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first.trim()) => rest,
        Some(_) => body,
        // single-line fence such as ```sql SELECT 1```
        None => match body.trim_start().split_once(char::is_whitespace) {
            Some((word, rest)) if !word.is_empty() && is_language_tag(word) => rest,
            _ => body,
        },
    }
}

fn is_language_tag(word: &str) -> bool {
    word.is_empty() || LANGUAGE_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(word))
}

fn strip_leading_marker(text: &str) -> &str {
    LEADING_MARKERS
        .iter()
        .find_map(|marker| {
            text.get(..marker.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(marker))
                .map(|_| &text[marker.len()..])
        })
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(s: &str) -> SanitizedText {
        SanitizedText::Sql(s.to_string())
    }

    #[test]
    fn test_sql_fence_with_language_tag() {
        let raw = "```sql\nSELECT COUNT(*) FROM projects\n```";
        assert_eq!(sanitize(raw), sql("SELECT COUNT(*) FROM projects"));
    }

    #[test]
    fn test_fence_without_language_tag() {
        let raw = "```\nSELECT title FROM projects\n```\n";
        assert_eq!(sanitize(raw), sql("SELECT title FROM projects"));
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(sanitize("```sql SELECT 1 FROM projects```"), sql("SELECT 1 FROM projects"));
        assert_eq!(sanitize("```SELECT 1 FROM projects```"), sql("SELECT 1 FROM projects"));
    }

    #[test]
    fn test_prose_around_fence_is_dropped() {
        let raw = "Here is your query:\n```postgresql\nSELECT title\nFROM projects\n```\nLet me know!";
        assert_eq!(sanitize(raw), sql("SELECT title\nFROM projects"));
    }

    #[test]
    fn test_unclosed_fence_keeps_remainder() {
        assert_eq!(sanitize("```sql\nSELECT id FROM projects"), sql("SELECT id FROM projects"));
    }

    #[test]
    fn test_leading_marker_removed() {
        assert_eq!(sanitize("SQL Query: SELECT id FROM projects"), sql("SELECT id FROM projects"));
        assert_eq!(sanitize("answer:SELECT id FROM projects"), sql("SELECT id FROM projects"));
    }

    #[test]
    fn test_sentinel_variants() {
        assert_eq!(sanitize("INVALID"), SanitizedText::OffTopic);
        assert_eq!(sanitize("  invalid \n"), SanitizedText::OffTopic);
        assert_eq!(sanitize("```\nINVALID\n```"), SanitizedText::OffTopic);
        assert_eq!(sanitize("```sql\nInvalid\n```"), SanitizedText::OffTopic);
        assert_eq!(sanitize("Answer: INVALID"), SanitizedText::OffTopic);
    }

    #[test]
    fn test_sentinel_must_match_whole_text() {
        assert_eq!(
            sanitize("SELECT 'INVALID' FROM projects"),
            sql("SELECT 'INVALID' FROM projects")
        );
    }

    #[test]
    fn test_clean_sql_is_untouched() {
        let clean = "SELECT title, description FROM projects ORDER BY created_at DESC LIMIT 1";
        assert_eq!(sanitize(clean), sql(clean));

        let SanitizedText::Sql(once) = sanitize("```sql\nSELECT id FROM projects\n```") else {
            panic!("expected sql");
        };
        assert_eq!(sanitize(&once), SanitizedText::Sql(once.clone()));
    }

    #[test]
    fn test_empty_output_yields_empty_candidate() {
        assert_eq!(sanitize(""), sql(""));
        assert_eq!(sanitize("```\n```"), sql(""));
    }
}
