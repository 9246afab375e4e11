//! Configuration management for Lambda functions.

use std::env;
use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Full database URL, takes precedence over host/name/secret
    pub database_url: Option<String>,
    /// Database host
    pub db_host: Option<String>,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: Option<String>,
    /// AWS region
    pub aws_region: String,
    /// Where the generation API key comes from
    pub generation_key: Option<KeySource>,
    /// Text-generation service settings
    pub generation: GenerationSettings,
    /// Budgets applied to generated queries
    pub query: QueryLimits,
}

/// Source of the text-generation credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Key given directly in the environment
    Plain(String),
    /// Key stored in Secrets Manager under this ARN
    SecretArn(String),
}

/// Text-generation settings that do not include the credential.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// Row and time budget for executing generated SQL.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub row_limit: usize,
    pub statement_timeout: Duration,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            row_limit: 100,
            statement_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        let db_host = var("DATABASE_HOST");
        let db_secret_arn = var("DATABASE_URL_SECRET_ARN");
        if database_url.is_none() && (db_host.is_none() || db_secret_arn.is_none()) {
            return Err(Error::Config(
                "DATABASE_URL or DATABASE_HOST with DATABASE_URL_SECRET_ARN must be set".to_string(),
            ));
        }

        let generation_key = var("GEMINI_API_KEY")
            .map(KeySource::Plain)
            .or_else(|| var("GEMINI_API_KEY_SECRET_ARN").map(KeySource::SecretArn));

        let defaults = GenerationSettings::default();
        let generation = GenerationSettings {
            endpoint: var("GEMINI_ENDPOINT").unwrap_or(defaults.endpoint),
            model: var("GEMINI_MODEL").unwrap_or(defaults.model),
            request_timeout: parse_var(&var, "GENERATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_attempts: parse_var(&var, "GENERATION_MAX_ATTEMPTS")?
                .map(|n: u32| n.max(1))
                .unwrap_or(defaults.max_attempts),
            backoff_base: parse_var(&var, "GENERATION_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
        };

        let limits = QueryLimits::default();
        let query = QueryLimits {
            row_limit: parse_var(&var, "QUERY_ROW_LIMIT")?
                .map(|n: usize| n.max(1))
                .unwrap_or(limits.row_limit),
            statement_timeout: parse_var(&var, "QUERY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(limits.statement_timeout),
        };

        Ok(Self {
            database_url,
            db_host,
            db_name: var("DATABASE_NAME").unwrap_or_else(|| "portfolio".to_string()),
            db_secret_arn,
            aws_region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            generation_key,
            generation,
            query,
        })
    }

    /// The generation key source, or a configuration error.
    ///
    /// The chat function calls this once during start-up and refuses to serve
    /// without a credential.
    pub fn require_generation_key(&self) -> Result<&KeySource> {
        self.generation_key.as_ref().ok_or_else(|| {
            Error::Config("GEMINI_API_KEY or GEMINI_API_KEY_SECRET_ARN must be set".to_string())
        })
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_database_url() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("GEMINI_API_KEY", "key-123"),
        ]))
        .unwrap();

        assert_eq!(config.generation_key, Some(KeySource::Plain("key-123".to_string())));
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.generation.request_timeout, Duration::from_secs(10));
        assert_eq!(config.query.row_limit, 100);
        assert_eq!(config.db_name, "portfolio");
    }

    #[test]
    fn test_missing_database_settings_is_config_error() {
        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "key")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_generation_key_fails_requirement() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("GEMINI_API_KEY", "   "),
        ]))
        .unwrap();

        assert!(config.generation_key.is_none());
        assert!(matches!(config.require_generation_key(), Err(Error::Config(_))));
    }

    #[test]
    fn test_secret_arn_key_source_and_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_HOST", "db.internal"),
            ("DATABASE_URL_SECRET_ARN", "arn:db"),
            ("GEMINI_API_KEY_SECRET_ARN", "arn:gemini"),
            ("GENERATION_MAX_ATTEMPTS", "0"),
            ("QUERY_ROW_LIMIT", "25"),
        ]))
        .unwrap();

        assert_eq!(
            config.generation_key,
            Some(KeySource::SecretArn("arn:gemini".to_string()))
        );
        assert_eq!(config.generation.max_attempts, 1);
        assert_eq!(config.query.row_limit, 25);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/portfolio"),
            ("QUERY_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("QUERY_TIMEOUT_SECS"));
    }
}
