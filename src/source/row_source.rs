use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::fmt;

/// Errors from batch enumeration
#[derive(Debug)]
pub enum SourceError {
    /// The primary key structure backing the cursor is no longer valid.
    /// Fatal to the job: the persisted cursor cannot be trusted.
    Schema(String),
    Database(sqlx::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Schema(msg) => write!(f, "Schema error: {}", msg),
            SourceError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<sqlx::Error> for SourceError {
    fn from(e: sqlx::Error) -> Self {
        SourceError::Database(e)
    }
}

/// Opaque resumption token: the primary key columns the ordering was built
/// on, and the key values of the last row already offered. Everything at or
/// before this point has been delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub keys: Vec<String>,
    pub values: Vec<Value>,
}

/// One fetched batch plus resumption state
#[derive(Debug)]
pub struct FetchResult {
    pub rows: Vec<Map<String, Value>>,
    /// Cursor pointing just past the last row, None when the batch is empty
    pub next_cursor: Option<String>,
    /// True when no further rows can match
    pub exhausted: bool,
}

/// Produces deterministic, resumable batches of rows matching a stored
/// filter, ordered by primary key ascending.
#[derive(Debug)]
pub struct RowSource {
    pool: SqlitePool,
    table: String,
    filter_expr: String,
    pks: Vec<String>,
}

impl RowSource {
    /// Introspect the table's primary key structure and build a source.
    /// Tables without an explicit primary key are keyed by rowid.
    pub async fn open(
        pool: SqlitePool,
        table: &str,
        filter_expr: &str,
    ) -> Result<Self, SourceError> {
        let pks = primary_key_columns(&pool, table).await?;
        Ok(Self {
            pool,
            table: table.to_string(),
            filter_expr: filter_expr.to_string(),
            pks,
        })
    }

    pub fn pks(&self) -> &[String] {
        &self.pks
    }

    /// Count the rows currently matching the filter
    pub async fn count(&self) -> Result<i64, SourceError> {
        let mut sql = format!("select count(*) from {}", quote_ident(&self.table));
        if !self.filter_expr.is_empty() {
            sql.push_str(&format!(" where ({})", self.filter_expr));
        }
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Fetch the next batch at or after `cursor`.
    ///
    /// Ordering is stable across calls, so a cursor value unambiguously
    /// marks how far the scan has progressed. Rows inserted behind the
    /// cursor after the job started are never revisited.
    pub async fn fetch(
        &self,
        cursor: Option<&str>,
        batch_size: usize,
    ) -> Result<FetchResult, SourceError> {
        let cursor = match cursor {
            Some(raw) => Some(self.decode_cursor(raw)?),
            None => None,
        };

        let quoted_pks: Vec<String> = self.pks.iter().map(|pk| quote_ident(pk)).collect();

        // rowid is hidden from `select *`, so it must be asked for by name
        let select_list = if self.pks == ["rowid"] {
            "rowid, *".to_string()
        } else {
            "*".to_string()
        };

        let mut conditions = Vec::new();
        if !self.filter_expr.is_empty() {
            conditions.push(format!("({})", self.filter_expr));
        }
        if cursor.is_some() {
            let placeholders = vec!["?"; self.pks.len()].join(", ");
            if self.pks.len() == 1 {
                conditions.push(format!("{} > ?", quoted_pks[0]));
            } else {
                // Row-value comparison keeps composite keyset pagination exact
                conditions.push(format!(
                    "({}) > ({})",
                    quoted_pks.join(", "),
                    placeholders
                ));
            }
        }

        let mut sql = format!("select {} from {}", select_list, quote_ident(&self.table));
        if !conditions.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&conditions.join(" and "));
        }
        sql.push_str(&format!(" order by {} limit ?", quoted_pks.join(", ")));

        let mut query = sqlx::query(&sql);
        if let Some(cursor) = &cursor {
            for value in &cursor.values {
                query = bind_json(query, value);
            }
        }
        query = query.bind(batch_size as i64);

        let raw_rows = query.fetch_all(&self.pool).await?;
        let exhausted = raw_rows.len() < batch_size;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in &raw_rows {
            rows.push(row_to_json(raw)?);
        }

        let next_cursor = match rows.last() {
            Some(last) => {
                let values = self
                    .pks
                    .iter()
                    .map(|pk| last.get(pk).cloned().unwrap_or(Value::Null))
                    .collect();
                let cursor = Cursor {
                    keys: self.pks.clone(),
                    values,
                };
                Some(serde_json::to_string(&cursor).map_err(|e| {
                    SourceError::Schema(format!("Could not encode cursor: {}", e))
                })?)
            }
            None => None,
        };

        Ok(FetchResult {
            rows,
            next_cursor,
            exhausted,
        })
    }

    fn decode_cursor(&self, raw: &str) -> Result<Cursor, SourceError> {
        let cursor: Cursor = serde_json::from_str(raw)
            .map_err(|e| SourceError::Schema(format!("Invalid cursor: {}", e)))?;
        if cursor.keys != self.pks {
            return Err(SourceError::Schema(format!(
                "Cursor was built on primary key ({}) but table '{}' now has ({})",
                cursor.keys.join(", "),
                self.table,
                self.pks.join(", ")
            )));
        }
        if cursor.values.len() != cursor.keys.len() {
            return Err(SourceError::Schema(
                "Cursor key/value arity mismatch".to_string(),
            ));
        }
        Ok(cursor)
    }
}

/// Primary key columns of a table, in key order; `["rowid"]` for tables
/// without an explicit primary key.
///
/// BLOB-declared key columns are rejected: the cursor stores key values as
/// JSON and a blob cannot round-trip through it, so keyset pagination would
/// refetch the same rows forever.
pub async fn primary_key_columns(
    pool: &SqlitePool,
    table: &str,
) -> Result<Vec<String>, SourceError> {
    let sql = format!("pragma table_info({})", quote_ident(table));
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    if rows.is_empty() {
        return Err(SourceError::Schema(format!("No such table: {}", table)));
    }

    let mut pks: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        let pk: i64 = row.try_get("pk")?;
        if pk > 0 {
            let name: String = row.try_get("name")?;
            let declared: String = row.try_get("type")?;
            if declared.to_ascii_uppercase().contains("BLOB") {
                return Err(SourceError::Schema(format!(
                    "Primary key column '{}' of table '{}' is BLOB, which cannot back a resumption cursor",
                    name, table
                )));
            }
            pks.push((pk, name));
        }
    }
    pks.sort_by_key(|(order, _)| *order);

    if pks.is_empty() {
        return Ok(vec!["rowid".to_string()]);
    }
    Ok(pks.into_iter().map(|(_, name)| name).collect())
}

/// Row identifiers for a slice of rows: scalars for single-column keys,
/// arrays for composite keys
pub fn pks_for_rows(rows: &[Map<String, Value>], pks: &[String]) -> Vec<Value> {
    if pks.len() == 1 {
        let pk = &pks[0];
        rows.iter()
            .map(|row| row.get(pk).cloned().unwrap_or(Value::Null))
            .collect()
    } else {
        rows.iter()
            .map(|row| {
                Value::Array(
                    pks.iter()
                        .map(|pk| row.get(pk).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect()
    }
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) type SqliteQuery<'q> =
    sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind a JSON value with its natural SQLite type
pub(crate) fn bind_json<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Materialize a SQLite row as a JSON object keyed by column name
fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, SourceError> {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(idx)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(idx)?;
                    Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
                }
                _ => Value::String(row.try_get::<String, _>(idx)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}
