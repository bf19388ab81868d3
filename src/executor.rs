//! SQL Execution Wrapper
//!
//! Runs generated SQL against the SQLite store. Every failure is returned as a
//! textual error so both sides of a comparison can always be displayed.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Error {
        message: String,
    },
}

impl QueryOutcome {
    fn error(message: impl Into<String>) -> Self {
        QueryOutcome::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::Error { .. })
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows { rows, .. } => rows.len(),
            QueryOutcome::Error { .. } => 0,
        }
    }
}

pub struct SqlExecutor {
    db_path: PathBuf,
    row_limit: usize,
}

impl SqlExecutor {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            row_limit: 1000,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn execute(&self, sql: &str) -> QueryOutcome {
        if !self.db_path.exists() {
            return QueryOutcome::error(format!("Database not found at {}", self.db_path.display()));
        }

        let conn = match Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
            Ok(conn) => conn,
            Err(e) => return QueryOutcome::error(e.to_string()),
        };
        run_query(&conn, sql, self.row_limit)
    }
}

/// Execute one statement and collect up to `row_limit` rows
pub fn run_query(conn: &Connection, sql: &str, row_limit: usize) -> QueryOutcome {
    debug!("Executing: {}", sql);
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => return QueryOutcome::error(e.to_string()),
    };

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows_iter = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => return QueryOutcome::error(e.to_string()),
    };

    let mut rows = Vec::new();
    loop {
        match rows_iter.next() {
            Ok(Some(row)) => {
                if rows.len() >= row_limit {
                    break;
                }
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    match row.get_ref(idx) {
                        Ok(value) => values.push(to_json(value)),
                        Err(e) => return QueryOutcome::error(e.to_string()),
                    }
                }
                rows.push(values);
            }
            Ok(None) => break,
            Err(e) => return QueryOutcome::error(e.to_string()),
        }
    }

    QueryOutcome::Rows { columns, rows }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::json!(i),
        ValueRef::Real(f) => serde_json::json!(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}
