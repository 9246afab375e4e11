//! Shared library for the portfolio Lambda functions.
//!
//! Holds the chat pipeline that turns a question into a read-only SQL query
//! and an answer, plus the configuration, database and HTTP helpers used by
//! every function.

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod gateway;
pub mod generation;
pub mod http;
pub mod models;
pub mod prompt;
pub mod sanitizer;
pub mod schema;
pub mod secrets;
pub mod validator;

#[cfg(test)]
mod testing;

pub use config::{Config, KeySource, QueryLimits};
pub use error::{Error, Result};
pub use executor::{PgReadOnlyDatabase, QueryExecutor};
pub use gateway::ChatGateway;
pub use generation::GenerationClient;
pub use models::{ChatRequest, ChatResponse, ContactRequest, CreateProjectRequest, HealthResponse, NewContact, NewProject, Project};
pub use schema::PORTFOLIO_SCHEMA;
pub use secrets::{get_database_credentials, get_secret, resolve_generation_key, DatabaseCredentials};
