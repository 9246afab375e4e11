//! Fakes for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::executor::{ExecutionError, ReadOnlyDatabase, Row};
use crate::generation::{AttemptError, GenerationBackend};

/// Returns scripted results in order, then repeats the last one.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, AttemptError>>>,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, AttemptError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

enum DbBehaviour {
    Rows(Vec<Row>),
    Fail(String),
    Hang,
}

/// Records every statement it receives.
pub struct RecordingDatabase {
    behaviour: DbBehaviour,
    executed: Mutex<Vec<String>>,
    row_limits: Mutex<Vec<usize>>,
}

impl RecordingDatabase {
    fn build(behaviour: DbBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            executed: Mutex::new(Vec::new()),
            row_limits: Mutex::new(Vec::new()),
        })
    }

    pub fn with_rows(rows: Vec<Row>) -> Arc<Self> {
        Self::build(DbBehaviour::Rows(rows))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::build(DbBehaviour::Fail(message.to_string()))
    }

    pub fn hanging() -> Arc<Self> {
        Self::build(DbBehaviour::Hang)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn row_limits(&self) -> Vec<usize> {
        self.row_limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadOnlyDatabase for RecordingDatabase {
    async fn fetch_rows(
        &self,
        sql: &str,
        row_limit: usize,
        _timeout: Duration,
    ) -> Result<Vec<Row>, ExecutionError> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.row_limits.lock().unwrap().push(row_limit);
        match &self.behaviour {
            DbBehaviour::Rows(rows) => Ok(rows.iter().take(row_limit).cloned().collect()),
            DbBehaviour::Fail(message) => Err(ExecutionError::Database(sqlx::Error::Protocol(
                message.clone(),
            ))),
            DbBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn project_row(id: i64, title: &str) -> Row {
    Row::new(vec![
        ("id".to_string(), Value::from(id)),
        ("title".to_string(), Value::from(title)),
    ])
}

pub fn count_row(count: i64) -> Row {
    Row::new(vec![("count".to_string(), Value::from(count))])
}
