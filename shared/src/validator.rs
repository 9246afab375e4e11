//! Safety boundary for generated SQL.
//!
//! Checks run cheapest and most dangerous first; the first failure decides
//! the verdict:
//!
//! 1. empty text
//! 2. more than one statement (raw semicolon scan)
//! 3. leading keyword other than `SELECT`
//! 4. comment introducers and denylisted keywords
//! 5. table references outside the allow-list
//!
//! Checks 4 and 5 run over Postgres tokens, so escape strings (`E'..'`) and
//! dollar-quoted bodies (`$tag$..$tag$`) are literals, never hidden SQL.
//!
//! The validator never rewrites the statement. A `Valid` verdict carries the
//! exact text it was given.

use std::fmt;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token as SqlToken, Tokenizer, Whitespace};

use crate::sanitizer::SanitizedText;
use crate::schema::SchemaDescription;

/// Keywords rejected anywhere in an otherwise well-formed SELECT.
const DENYLIST: &[&str] = &[
    "ATTACH", "DETACH", "PRAGMA", "INTO", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER",
    "CREATE", "TRUNCATE", "GRANT", "REVOKE", "COPY", "VACUUM",
];

/// Functions whose argument list uses `FROM` without naming a table.
const FROM_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "OVERLAY"];

/// Keywords that end a FROM clause at the current nesting level.
const FROM_TERMINATORS: &[&str] = &[
    "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION", "INTERSECT", "EXCEPT",
    "WINDOW", "FETCH", "FOR",
];

/// SQL that passed every check. Only this module can construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedSql(String);

impl ApprovedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of one candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(ApprovedSql),
    InvalidOffTopic,
    InvalidNotSql(String),
    InvalidUnsafe(String),
}

impl Verdict {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Valid(_) => "valid",
            Verdict::InvalidOffTopic => "off_topic",
            Verdict::InvalidNotSql(_) => "not_sql",
            Verdict::InvalidUnsafe(_) => "unsafe",
        }
    }

    fn not_sql(reason: impl Into<String>) -> Self {
        Verdict::InvalidNotSql(reason.into())
    }

    fn unsafe_sql(reason: impl Into<String>) -> Self {
        Verdict::InvalidUnsafe(reason.into())
    }
}

/// Validates candidate statements against a fixed schema allow-list.
#[derive(Debug, Clone, Copy)]
pub struct SqlValidator {
    schema: SchemaDescription,
}

impl SqlValidator {
    pub fn new(schema: SchemaDescription) -> Self {
        Self { schema }
    }

    /// Validate sanitizer output. The off-topic sentinel short-circuits.
    pub fn validate(&self, text: &SanitizedText) -> Verdict {
        match text {
            SanitizedText::OffTopic => Verdict::InvalidOffTopic,
            SanitizedText::Sql(sql) => self.validate_sql(sql),
        }
    }

    pub fn validate_sql(&self, sql: &str) -> Verdict {
        match self.check(sql) {
            Ok(()) => Verdict::Valid(ApprovedSql(sql.to_string())),
            Err(verdict) => verdict,
        }
    }

    fn check(&self, sql: &str) -> Result<(), Verdict> {
        if sql.trim().is_empty() {
            return Err(Verdict::not_sql("empty statement"));
        }

        check_single_statement(sql)?;
        check_leading_keyword(sql)?;

        let tokens = lex(sql).map_err(|e| Verdict::not_sql(format!("unreadable statement: {}", e)))?;
        check_denylist(&tokens)?;
        check_tables(&tokens, &self.schema)
    }
}

fn check_single_statement(sql: &str) -> Result<(), Verdict> {
    let body = sql.trim_end();
    let body = body.strip_suffix(';').unwrap_or(body);
    if body.contains(';') {
        return Err(Verdict::unsafe_sql("multiple statements"));
    }
    Ok(())
}

fn check_leading_keyword(sql: &str) -> Result<(), Verdict> {
    let start = sql.trim_start();
    let end = start
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(start.len());
    if start[..end].eq_ignore_ascii_case("SELECT") {
        Ok(())
    } else {
        Err(Verdict::unsafe_sql("non-SELECT statement"))
    }
}

fn check_denylist(tokens: &[Token]) -> Result<(), Verdict> {
    for token in tokens {
        match token {
            Token::Comment => return Err(Verdict::unsafe_sql("comment syntax")),
            Token::Word(word) => {
                if DENYLIST.iter().any(|k| k.eq_ignore_ascii_case(word)) {
                    return Err(Verdict::unsafe_sql(format!(
                        "forbidden keyword {}",
                        word.to_ascii_uppercase()
                    )));
                }
                if word.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("pg_")) {
                    return Err(Verdict::unsafe_sql("system catalog reference"));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Nesting level of the FROM-clause scan.
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    /// Parenthesis opened by EXTRACT and friends
    from_function: bool,
    /// Commas at this level separate FROM items
    in_from: bool,
}

fn check_tables(tokens: &[Token], schema: &SchemaDescription) -> Result<(), Verdict> {
    let mut frames = vec![Frame::default()];
    let mut expect_table = false;
    let mut tables = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1);

        if expect_table {
            match token {
                Token::Punct('(') => {
                    let subquery = matches!(next, Some(Token::Word(w)) if is_kw(w, "SELECT") || is_kw(w, "VALUES"));
                    frames.push(Frame {
                        from_function: false,
                        in_from: !subquery,
                    });
                    expect_table = !subquery;
                }
                Token::Word(w) if is_kw(w, "ONLY") || is_kw(w, "LATERAL") => {}
                Token::Word(_) | Token::QuotedIdent(_) => {
                    if matches!(next, Some(Token::Punct('.')) | Some(Token::Punct('('))) {
                        return Err(Verdict::not_sql("unknown table"));
                    }
                    let allowed = match token {
                        Token::Word(w) => schema.has_table(&w.to_ascii_lowercase()),
                        Token::QuotedIdent(q) => schema.has_table(q),
                        _ => false,
                    };
                    if !allowed {
                        return Err(Verdict::not_sql("unknown table"));
                    }
                    tables += 1;
                    expect_table = false;
                }
                _ => return Err(Verdict::not_sql("malformed FROM clause")),
            }
            continue;
        }

        match token {
            Token::Punct('(') => {
                let from_function = i > 0
                    && matches!(&tokens[i - 1], Token::Word(w) if FROM_FUNCTIONS.iter().any(|f| is_kw(w, f)));
                frames.push(Frame {
                    from_function,
                    in_from: false,
                });
            }
            Token::Punct(')') => {
                if frames.len() == 1 {
                    return Err(Verdict::not_sql("unbalanced parentheses"));
                }
                frames.pop();
            }
            Token::Punct(',') => {
                if current(&frames).in_from {
                    expect_table = true;
                }
            }
            Token::Word(w) if is_kw(w, "FROM") => {
                let frame = current_mut(&mut frames);
                if !frame.from_function {
                    frame.in_from = true;
                    expect_table = true;
                }
            }
            Token::Word(w) if is_kw(w, "JOIN") => {
                current_mut(&mut frames).in_from = true;
                expect_table = true;
            }
            // `TABLE name` is shorthand for `SELECT * FROM name`
            Token::Word(w) if is_kw(w, "TABLE") => {
                expect_table = true;
            }
            Token::Word(w) if FROM_TERMINATORS.iter().any(|t| is_kw(w, t)) => {
                current_mut(&mut frames).in_from = false;
            }
            _ => {}
        }
    }

    if expect_table {
        return Err(Verdict::not_sql("missing table after FROM"));
    }
    if frames.len() != 1 {
        return Err(Verdict::not_sql("unbalanced parentheses"));
    }
    if tables == 0 {
        return Err(Verdict::not_sql("no table referenced"));
    }
    Ok(())
}

fn current<'f>(frames: &'f [Frame]) -> &'f Frame {
    // frames always holds the root level
    &frames[frames.len() - 1]
}

fn current_mut<'f>(frames: &'f mut [Frame]) -> &'f mut Frame {
    let last = frames.len() - 1;
    &mut frames[last]
}

fn is_kw(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// The parts of a Postgres token stream the checks look at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Bare identifier or keyword
    Word(String),
    /// Contents of a double-quoted identifier
    QuotedIdent(String),
    Punct(char),
    /// `--` or `/* */` outside a literal
    Comment,
    /// Literals, numbers, operators and placeholders
    Other,
}

fn lex(sql: &str) -> Result<Vec<Token>, sqlparser::tokenizer::TokenizerError> {
    let tokens = Tokenizer::new(&PostgreSqlDialect {}, sql).tokenize()?;
    Ok(tokens.into_iter().filter_map(classify).collect())
}

fn classify(token: SqlToken) -> Option<Token> {
    let token = match token {
        SqlToken::EOF => return None,
        SqlToken::Whitespace(Whitespace::SingleLineComment { .. })
        | SqlToken::Whitespace(Whitespace::MultiLineComment(_)) => Token::Comment,
        SqlToken::Whitespace(_) => return None,
        SqlToken::Word(w) if w.quote_style.is_some() => Token::QuotedIdent(w.value),
        SqlToken::Word(w) => Token::Word(w.value),
        SqlToken::LParen => Token::Punct('('),
        SqlToken::RParen => Token::Punct(')'),
        SqlToken::Comma => Token::Punct(','),
        SqlToken::Period => Token::Punct('.'),
        _ => Token::Other,
    };
    Some(token)
}
