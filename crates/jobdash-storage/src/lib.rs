//! Query execution seam + Postgres implementation and schema capability probes.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use jobdash_core::{Row, SqlValue};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as _};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "jobdash-storage";

const TABLE_EXISTS_SQL: &str = "\
    SELECT 1 AS present \
      FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1 \
     LIMIT 1";

const COLUMN_EXISTS_SQL: &str = "\
    SELECT 1 AS present \
      FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2 \
     LIMIT 1";

/// Column a statement selects to fix the order of its rows. The Postgres
/// executor sorts the wrapped statement on it and drops it from each row.
pub const ROW_ORDINAL: &str = "row_ordinal";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            max_connections: std::env::var("JOBDASH_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unexpected row shape: {0}")]
    Shape(String),
    #[error("{0}")]
    Message(String),
}

/// Executes one parameterized statement and returns its rows as JSON objects.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is not set")?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        let statement = wrap_statement(sql);
        let span = info_span!("store_query", params = params.len());
        async {
            debug!(sql = %statement, "executing");
            let mut query = sqlx::query(&statement);
            for param in params {
                query = match param {
                    SqlValue::Int(v) => query.bind(*v),
                    SqlValue::Float(v) => query.bind(*v),
                    SqlValue::Text(v) => query.bind(v.as_str()),
                };
            }
            let rows = query.fetch_all(&self.pool).await?;

            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let doc: serde_json::Value = row.try_get("doc")?;
                match doc {
                    serde_json::Value::Object(map) => out.push(map),
                    other => return Err(StoreError::Shape(other.to_string())),
                }
            }
            Ok(out)
        }
        .instrument(span)
        .await
    }
}

/// Folds each result row into one jsonb document so reports can return
/// arbitrary column sets without per-report row structs. Postgres does not
/// promise that a subquery keeps its order, so a statement that selects
/// [`ROW_ORDINAL`] is re-sorted on it here.
fn wrap_statement(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    if inner.contains(ROW_ORDINAL) {
        format!(
            "SELECT to_jsonb(q) - '{ROW_ORDINAL}' AS doc FROM ({inner}) AS q ORDER BY q.{ROW_ORDINAL}"
        )
    } else {
        format!("SELECT to_jsonb(q) AS doc FROM ({inner}) AS q")
    }
}

/// Read-only catalog checks for optional tables and columns. Results are not
/// cached; every call re-reads the catalog.
pub struct SchemaProbe<'a> {
    executor: &'a dyn QueryExecutor,
}

impl<'a> SchemaProbe<'a> {
    pub fn new(executor: &'a dyn QueryExecutor) -> Self {
        Self { executor }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let rows = self
            .executor
            .fetch_rows(TABLE_EXISTS_SQL, &[SqlValue::from(table)])
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let rows = self
            .executor
            .fetch_rows(COLUMN_EXISTS_SQL, &[SqlValue::from(table), SqlValue::from(column)])
            .await?;
        Ok(!rows.is_empty())
    }
}

/// Round-trips a trivial statement.
pub async fn ping(executor: &dyn QueryExecutor) -> Result<(), StoreError> {
    executor.fetch_rows("SELECT 1 AS ok", &[]).await.map(|_| ())
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail(String),
}

/// In-memory executor with canned replies, for exercising reports and routes
/// without a database.
///
/// Catalog probes report every table and column as present unless removed
/// with [`ScriptedExecutor::without_table`] / [`ScriptedExecutor::without_column`].
/// Other statements get the reply of the first registered needle contained in
/// the SQL text, or no rows.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    replies: Vec<(String, Reply)>,
    missing_tables: HashSet<String>,
    missing_columns: HashSet<(String, String)>,
    calls: Mutex<Vec<RecordedQuery>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// `rows` must be a JSON array of objects; anything else yields no rows.
    pub fn reply(mut self, needle: &str, rows: serde_json::Value) -> Self {
        let rows = match rows {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.replies.push((needle.to_string(), Reply::Rows(rows)));
        self
    }

    pub fn fail(mut self, needle: &str, message: &str) -> Self {
        self.replies
            .push((needle.to_string(), Reply::Fail(message.to_string())));
        self
    }

    pub fn without_table(mut self, table: &str) -> Self {
        self.missing_tables.insert(table.to_string());
        self
    }

    pub fn without_column(mut self, table: &str, column: &str) -> Self {
        self.missing_columns
            .insert((table.to_string(), column.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn text_param(params: &[SqlValue], index: usize) -> &str {
        match params.get(index) {
            Some(SqlValue::Text(v)) => v.as_str(),
            _ => "",
        }
    }

    fn probe_reply(&self, present: bool) -> Vec<Row> {
        if present {
            let mut row = Row::new();
            row.insert("present".into(), 1.into());
            vec![row]
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn fetch_rows(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedQuery {
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        if sql.contains("information_schema.tables") {
            let table = Self::text_param(params, 0);
            return Ok(self.probe_reply(!self.missing_tables.contains(table)));
        }
        if sql.contains("information_schema.columns") {
            let table = Self::text_param(params, 0);
            let column = Self::text_param(params, 1);
            let present = !self.missing_tables.contains(table)
                && !self
                    .missing_columns
                    .contains(&(table.to_string(), column.to_string()));
            return Ok(self.probe_reply(present));
        }

        match self.replies.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, Reply::Rows(rows))) => Ok(rows.clone()),
            Some((_, Reply::Fail(message))) => Err(StoreError::Message(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn probe_reports_missing_column() {
        let exec = ScriptedExecutor::new().without_column("employments", "job_application_id");
        let probe = SchemaProbe::new(&exec);

        assert!(probe.table_exists("employments").await.unwrap());
        assert!(probe.column_exists("employments", "jobpost_id").await.unwrap());
        assert!(!probe
            .column_exists("employments", "job_application_id")
            .await
            .unwrap());

        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].params,
            vec![
                SqlValue::Text("employments".into()),
                SqlValue::Text("job_application_id".into())
            ]
        );
    }

    #[tokio::test]
    async fn missing_table_hides_its_columns() {
        let exec = ScriptedExecutor::new().without_table("employments");
        let probe = SchemaProbe::new(&exec);
        assert!(!probe.table_exists("employments").await.unwrap());
        assert!(!probe.column_exists("employments", "jobpost_id").await.unwrap());
    }

    #[tokio::test]
    async fn first_matching_needle_wins() {
        let exec = ScriptedExecutor::new()
            .reply("FROM agg", json!([{"total": 3}]))
            .fail("FROM jobposts", "relation does not exist");

        let rows = exec.fetch_rows("SELECT COUNT(*) FROM agg", &[]).await.unwrap();
        assert_eq!(rows[0]["total"], json!(3));

        let err = exec.fetch_rows("SELECT * FROM jobposts", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "relation does not exist");

        assert!(exec.fetch_rows("SELECT 1", &[]).await.unwrap().is_empty());
        assert!(ping(&exec).await.is_ok());
    }

    #[test]
    fn numbered_statements_are_sorted_outside_the_wrapper() {
        let wrapped = wrap_statement(
            "SELECT a, ROW_NUMBER() OVER (ORDER BY a) AS row_ordinal FROM t ORDER BY a LIMIT $1;",
        );
        assert!(wrapped.starts_with("SELECT to_jsonb(q) - 'row_ordinal' AS doc FROM (SELECT a,"));
        assert!(wrapped.ends_with("LIMIT $1) AS q ORDER BY q.row_ordinal"));

        let plain = wrap_statement("  SELECT 1 AS ok ");
        assert_eq!(plain, "SELECT to_jsonb(q) AS doc FROM (SELECT 1 AS ok) AS q");
    }
}
