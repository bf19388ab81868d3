//! Value Scanner - snapshots distinct column values from the source database
//!
//! Feeds the synonym graph builder. Values can also round-trip through CSV so a
//! snapshot can be reviewed or trimmed by hand before aliases are generated.

use crate::error::{Result, SptsError};
use crate::synonyms::CanonicalValue;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Distinct value with its row count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFrequency {
    pub value: String,
    pub frequency: i64,
}

/// Open the source database read-only
pub fn open_read_only(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SptsError::Database(format!("Database not found at {}", path.display())));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| SptsError::Database(format!("Failed to open {}: {}", path.display(), e)))
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Columns of `table` with TEXT affinity
pub fn text_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(SptsError::Database(format!("Table '{}' not found", table)));
    }

    // SQLite affinity rules: a declared type containing CHAR, CLOB or TEXT is text
    Ok(columns
        .into_iter()
        .filter(|(_, decl)| {
            let decl = decl.to_uppercase();
            decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT")
        })
        .map(|(name, _)| name)
        .collect())
}

/// Distinct non-null values of one column, in scan order
pub fn scan_distinct_values(
    conn: &Connection,
    table: &str,
    column: &str,
    limit: usize,
) -> Result<Vec<CanonicalValue>> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM {tbl} WHERE {col} IS NOT NULL LIMIT ?1",
        col = quote_ident(column),
        tbl = quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = stmt
        .query_map([limit as i64], |row| row.get::<_, Value>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let values: Vec<CanonicalValue> = values
        .into_iter()
        .filter_map(value_text)
        .filter(|s| !s.trim().is_empty())
        .map(|s| CanonicalValue::new(s, table, column))
        .collect();

    info!("Scanned {} distinct values from {}.{}", values.len(), table, column);
    Ok(values)
}

/// Text form of a scanned cell; blobs and NULL have none
fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Blob(_) | Value::Null => None,
    }
}

/// Most frequent values of one column, descending
pub fn value_frequencies(
    conn: &Connection,
    table: &str,
    column: &str,
    limit: usize,
) -> Result<Vec<ValueFrequency>> {
    let sql = format!(
        "SELECT {col}, COUNT(*) AS frequency FROM {tbl} WHERE {col} IS NOT NULL \
         GROUP BY {col} ORDER BY frequency DESC, {col} ASC LIMIT ?1",
        col = quote_ident(column),
        tbl = quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([limit as i64], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(value, frequency)| Some(ValueFrequency { value: value_text(value)?, frequency }))
        .collect())
}

/// Write `(column, frequency)` rows to CSV with a header
pub fn write_frequencies_csv(
    path: impl AsRef<Path>,
    column: &str,
    rows: &[ValueFrequency],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record([column, "frequency"])?;
    for row in rows {
        let frequency = row.frequency.to_string();
        writer.write_record([row.value.as_str(), frequency.as_str()])?;
    }
    writer.flush()?;
    info!("Wrote {} values to {}", rows.len(), path.as_ref().display());
    Ok(())
}

/// Read canonical values from the first column of a CSV file with a header row
pub fn read_values_csv(
    path: impl AsRef<Path>,
    table: &str,
    column: &str,
    limit: Option<usize>,
) -> Result<Vec<CanonicalValue>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(0).map(str::trim).filter(|v| !v.is_empty()) {
            values.push(CanonicalValue::new(value, table, column));
        }
        if limit.map_or(false, |l| values.len() >= l) {
            break;
        }
    }
    Ok(values)
}
