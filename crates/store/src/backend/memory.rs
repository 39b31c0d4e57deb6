//! Controllable in-memory backend for tests.
//!
//! Not a SQL engine: queries return canned responses enqueued by the test
//! (FIFO), while every statement is recorded for inspection and bulk inserts
//! are captured per table. Failures can be injected for the next N calls to
//! exercise error propagation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sediment_types::error::BackendSnafu;
use sediment_types::Result;
use serde::Serialize;

use super::{Backend, Params, Row};

/// What kind of call produced a recorded [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `Backend::execute`.
    Execute,
    /// `Backend::query`.
    Query,
}

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Execute or query.
    pub kind: StatementKind,
    /// The SQL text as submitted.
    pub sql: String,
    /// The placeholder bindings as submitted.
    pub params: Params,
}

/// In-memory [`Backend`] test double.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Every execute/query call, in order.
    statements: Mutex<Vec<Statement>>,
    /// Canned query responses, consumed FIFO. An exhausted queue answers
    /// with no rows.
    responses: Mutex<VecDeque<Vec<Row>>>,
    /// Captured bulk inserts, per table.
    inserted: Mutex<HashMap<String, Vec<Row>>>,
    /// Failures left to inject.
    fail_next: AtomicUsize,
    /// Total query calls.
    query_count: AtomicUsize,
    /// Total execute calls.
    execute_count: AtomicUsize,
    /// Total insert calls.
    insert_count: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues one canned response for the next unanswered query.
    pub fn enqueue(&self, rows: Vec<Row>) {
        self.responses.lock().push_back(rows);
    }

    /// Enqueues a canned response built from serializable values.
    ///
    /// Convenience for handing the store `DocumentRow`s or edges directly.
    pub fn enqueue_rows<T: Serialize>(&self, values: &[T]) {
        self.enqueue(values.iter().filter_map(to_row).collect());
    }

    /// Makes the next `count` calls fail with a backend error.
    pub fn inject_failures(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// All recorded statements so far.
    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    /// Rows bulk-inserted into `table` so far.
    #[must_use]
    pub fn table_rows(&self, table: &str) -> Vec<Row> {
        self.inserted.lock().get(table).cloned().unwrap_or_default()
    }

    /// Number of query calls seen.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Number of execute calls seen.
    #[must_use]
    pub fn execute_count(&self) -> usize {
        self.execute_count.load(Ordering::SeqCst)
    }

    /// Number of insert calls seen.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.insert_count.load(Ordering::SeqCst)
    }

    /// Consumes an injected failure if one is pending.
    fn check_failure(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(BackendSnafu { message: "injected failure".to_string() }.build());
        }
        Ok(())
    }
}

/// Serializes a value into a backend row; non-object shapes are skipped.
pub fn to_row<T: Serialize>(value: &T) -> Option<Row> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, sql: &str, params: &Params) -> Result<()> {
        self.check_failure()?;
        self.execute_count.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(Statement {
            kind: StatementKind::Execute,
            sql: sql.to_string(),
            params: params.clone(),
        });
        Ok(())
    }

    async fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.check_failure()?;
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(Statement {
            kind: StatementKind::Query,
            sql: sql.to_string(),
            params: params.clone(),
        });
        Ok(self.responses.lock().pop_front().unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        self.check_failure()?;
        self.insert_count.fetch_add(1, Ordering::SeqCst);
        self.inserted.lock().entry(table.to_string()).or_default().extend(rows);
        Ok(())
    }
}
