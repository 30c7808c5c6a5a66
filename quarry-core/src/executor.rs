//! Query execution over a single, lazily opened connection
//!
//! [`Engine`] never returns errors from its query methods. A failed connect
//! or statement is logged, stored as a sticky message readable through
//! [`Engine::last_error`], and surfaces to the caller as `None` or `false`.
//! Callers that ignore `last_error()` simply see empty results.

use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::AnyConnection;
use sqlx::{Any, Column, Connection, Executor, Row as _};
use tracing::{debug, warn};

use crate::config::{DatabaseConfig, EngineKind};
use crate::dialect::{self, Dialect};
use crate::{Error, Result, Value};

/// A fetched row, keyed by column name in select order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Source location that issued a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
}

impl From<&Location<'_>> for CallSite {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Timings of the most recent statement, recorded when diagnostics are on
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub started_at: Option<DateTime<Utc>>,
    /// Time until the first row (or the end of the result) was available
    pub exec_duration: Duration,
    /// Time spent reading the remaining rows
    pub fetch_duration: Duration,
    pub row_count: u64,
    pub call_site: Option<CallSite>,
}

/// Executes SQL for one logical database.
///
/// The connection is opened on first use and reused until [`Engine::close`]
/// or a database switch that needs a reconnect. There is no internal locking:
/// concurrent callers need one engine each.
pub struct Engine {
    config: DatabaseConfig,
    kind: EngineKind,
    dialect: Box<dyn Dialect>,
    conn: Option<AnyConnection>,
    last_query: Option<String>,
    last_error: Option<String>,
    stats: Option<Stats>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("engine", &self.config.engine)
            .field("dialect", &self.dialect)
            .field("connected", &self.conn.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Engine {
    /// Create an engine for the configured database.
    ///
    /// Fails immediately for engine names nothing can drive. No connection
    /// is opened here.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let dialect = dialect::for_engine(&config.engine);
        Self::with_dialect(config, dialect)
    }

    /// Create an engine with an explicit dialect in place of the default one
    pub fn with_dialect(config: DatabaseConfig, dialect: Box<dyn Dialect>) -> Result<Self> {
        let kind = config.kind()?;
        Ok(Self {
            config,
            kind,
            dialect,
            conn: None,
            last_query: None,
            last_error: None,
            stats: None,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Message of the last failed call; cleared by the next `query` or `connect`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Text of the last statement sent to the database
    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    /// Statistics of the last statement; `None` unless diagnostics are enabled
    pub fn stats(&self) -> Option<&Stats> {
        self.stats.as_ref()
    }

    /// Open the connection now. Returns `false` and records the error on failure.
    ///
    /// An already open connection is kept as is.
    pub async fn connect(&mut self) -> bool {
        self.last_error = None;
        if self.conn.is_some() {
            return true;
        }
        match self.open().await {
            Ok(()) => true,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    /// Drop the connection; the next query reconnects.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.close().await {
                warn!(error = %err, "error while closing database connection");
            }
        }
    }

    /// Run `sql` and collect its rows.
    ///
    /// Values bind positionally to `?` placeholders through a prepared
    /// statement; without values or placeholders the text is executed
    /// directly. The first `offset` rows are read and discarded, and at most
    /// `limit` rows are kept (zero means all), so only the needed rows are
    /// materialised.
    #[track_caller]
    pub fn query<'e>(
        &'e mut self,
        sql: &'e str,
        values: &'e [Value],
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Option<Vec<Row>>> + 'e {
        let caller = Location::caller();
        self.query_at(sql, values, offset, limit, caller)
    }

    pub(crate) async fn query_at(
        &mut self,
        sql: &str,
        values: &[Value],
        offset: u64,
        limit: u64,
        caller: &'static Location<'static>,
    ) -> Option<Vec<Row>> {
        self.last_error = None;
        if self.config.diagnostics {
            self.stats = None;
        }
        match self.run(sql, values, offset, limit, caller).await {
            Ok(rows) => Some(rows),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// Make `name` the active database.
    ///
    /// Uses the dialect's switch statement when it has one; otherwise the
    /// configuration is updated and the connection reopened.
    pub async fn use_database(&mut self, name: &str) -> bool {
        if let Some(sql) = self.dialect.switch_database(name) {
            let switched = self.query(&sql, &[], 0, 0).await.is_some();
            if switched {
                self.config.database = Some(name.to_string());
            }
            return switched;
        }

        debug!(database = name, "dialect cannot switch databases in place, reconnecting");
        match self.kind {
            EngineKind::Sqlite => self.config.path = Some(name.to_string()),
            EngineKind::MySql | EngineKind::Postgres => {
                self.config.database = Some(name.to_string())
            }
        }
        self.close().await;
        self.connect().await
    }

    /// Names of the tables in the active database
    pub async fn list_tables(&mut self) -> Option<Vec<String>> {
        let Some(sql) = self.dialect.list_tables_query() else {
            self.fail(Error::invalid_query(format!(
                "the {} dialect cannot list tables",
                self.dialect.engine_name()
            )));
            return None;
        };

        let rows = self.query(sql, &[], 0, 0).await?;
        Some(
            rows.into_iter()
                .filter_map(|row| row.into_iter().next())
                .filter_map(|(_, name)| name.as_str().map(str::to_string))
                .collect(),
        )
    }

    async fn open(&mut self) -> Result<()> {
        sqlx::any::install_default_drivers();
        let url = self.config.to_url()?;
        debug!(engine = %self.config.engine, "opening database connection");
        self.conn = Some(AnyConnection::connect(&url).await?);
        Ok(())
    }

    pub(crate) fn fail(&mut self, err: Error) {
        warn!(error = %err, "database call failed");
        self.last_error = Some(err.to_string());
    }

    async fn run(
        &mut self,
        sql: &str,
        values: &[Value],
        offset: u64,
        limit: u64,
        caller: &'static Location<'static>,
    ) -> Result<Vec<Row>> {
        if self.conn.is_none() {
            self.open().await?;
        }

        let prepared = !values.is_empty() && sql.contains('?');
        let sql = match self.kind {
            EngineKind::Postgres if prepared => numbered_placeholders(sql),
            _ => sql.to_string(),
        };
        self.last_query = Some(sql.clone());
        debug!(sql = %sql, params = values.len(), offset, limit, "executing query");

        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        let started_at = Utc::now();
        let started = Instant::now();

        let (rows, exec_duration, fetch_duration) = {
            let mut stream = if prepared {
                bind_values(sqlx::query(&sql), values).fetch(&mut *conn)
            } else {
                Executor::fetch(&mut *conn, sql.as_str())
            };

            let mut next = stream.try_next().await?;
            let exec_duration = started.elapsed();
            let fetching = Instant::now();

            let mut rows = Vec::new();
            let mut index = 0u64;
            while let Some(row) = next {
                if index >= offset {
                    rows.push(row_to_json(&row));
                    if limit > 0 && rows.len() as u64 >= limit {
                        break;
                    }
                }
                index += 1;
                next = stream.try_next().await?;
            }
            (rows, exec_duration, fetching.elapsed())
        };

        debug!(rows = rows.len(), "query finished");
        if self.config.diagnostics {
            self.stats = Some(Stats {
                started_at: Some(started_at),
                exec_duration,
                fetch_duration,
                row_count: rows.len() as u64,
                call_site: Some(caller.into()),
            });
        }
        Ok(rows)
    }
}

/// Bind Quarry Values to a SQLx query
fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, Any, AnyArguments<'q>>,
    params: &[Value],
) -> sqlx::query::Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::I32(i) => query.bind(*i),
            Value::I64(i) => query.bind(*i),
            Value::F32(f) => query.bind(*f),
            Value::F64(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Json(j) => query.bind(j.to_string()),
            Value::Array(_) => query.bind(value_to_json(param).to_string()),
        };
    }
    query
}

/// Convert Value to serde_json::Value for array serialization
fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I32(i) => serde_json::Value::from(*i),
        Value::I64(i) => serde_json::Value::from(*i),
        Value::F32(f) => serde_json::Number::from_f64(*f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::F64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::from(b.clone()),
        Value::Json(j) => j.clone(),
        Value::Array(arr) => serde_json::Value::Array(arr.iter().map(value_to_json).collect()),
    }
}

fn row_to_json(row: &AnyRow) -> Row {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_cell(row, column.ordinal())))
        .collect()
}

// The any driver checks type compatibility on decode, so try the common
// Rust types from most to least specific until one fits.
fn decode_cell(row: &AnyRow, index: usize) -> serde_json::Value {
    use serde_json::Value as Json;

    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Json::Null, Json::from);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map_or(Json::Null, Json::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map_or(Json::Null, Json::Number);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v
            .and_then(|f| serde_json::Number::from_f64(f as f64))
            .map_or(Json::Null, Json::Number);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Json::Null, Json::String);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Json::Null, Json::Bool);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(Json::Null, Json::from);
    }
    Json::Null
}

/// Rewrite `?` placeholders to PostgreSQL's `$1, $2, ...`, leaving quoted text alone.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;

    for ch in sql.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(ch),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_engine_is_fatal() {
        let mut config = DatabaseConfig::sqlite(":memory:");
        config.engine = "oracle".to_string();
        let result = Engine::new(config);
        assert!(matches!(result, Err(Error::UnsupportedEngine { .. })));
    }

    #[test]
    fn test_engine_picks_dialect() {
        let engine = Engine::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        assert_eq!(engine.dialect().engine_name(), "sqlite");
        assert!(!engine.is_connected());

        let engine = Engine::new(DatabaseConfig::mysql("h", "u", "p", "d")).unwrap();
        assert_eq!(engine.dialect().engine_name(), "mysql");
    }

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(
            numbered_placeholders("SELECT * FROM t WHERE a = ? AND b IN (?, ?)"),
            "SELECT * FROM t WHERE a = $1 AND b IN ($2, $3)"
        );
        assert_eq!(
            numbered_placeholders("SELECT '?' AS q, \"w?\" FROM t WHERE a = ?"),
            "SELECT '?' AS q, \"w?\" FROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_value_to_json_conversion() {
        assert_eq!(value_to_json(&Value::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(&Value::Bool(true)), serde_json::json!(true));
        let arr = Value::Array(vec![Value::I32(1), Value::from("a")]);
        assert_eq!(value_to_json(&arr), serde_json::json!([1, "a"]));
    }

    #[test]
    fn test_missing_path_records_error() {
        let mut config = DatabaseConfig::sqlite("unused");
        config.path = None;
        let mut engine = Engine::new(config).unwrap();

        let connected = tokio_test::block_on(engine.connect());
        assert!(!connected);
        assert!(engine
            .last_error()
            .unwrap()
            .contains("sqlite engine needs a file path"));
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use super::*;

        async fn people() -> Engine {
            let mut engine = Engine::new(DatabaseConfig::sqlite(":memory:")).unwrap();
            engine
                .query(
                    "CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT, score REAL)",
                    &[],
                    0,
                    0,
                )
                .await
                .unwrap();
            for (id, name) in [(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "E")] {
                let values = [Value::I32(id), Value::from(name), Value::F64(id as f64 / 2.0)];
                engine
                    .query("INSERT INTO person (id, name, score) VALUES (?, ?, ?)", &values, 0, 0)
                    .await
                    .unwrap();
            }
            engine
        }

        #[tokio::test]
        async fn test_lazy_connect_and_decode() {
            let mut engine = people().await;
            assert!(engine.is_connected());

            let rows = engine
                .query("SELECT id, name, score FROM person WHERE id = ?", &[Value::I32(2)], 0, 0)
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["id"], serde_json::json!(2));
            assert_eq!(rows[0]["name"], serde_json::json!("B"));
            assert_eq!(rows[0]["score"], serde_json::json!(1.0));
            let columns: Vec<_> = rows[0].keys().cloned().collect();
            assert_eq!(columns, vec!["id", "name", "score"]);
        }

        #[tokio::test]
        async fn test_row_skipping() {
            let mut engine = people().await;
            let rows = engine
                .query("SELECT name FROM person ORDER BY id", &[], 1, 3)
                .await
                .unwrap();
            let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
            assert_eq!(names, vec!["B", "C", "D"]);

            let rows = engine
                .query("SELECT name FROM person ORDER BY id", &[], 3, 0)
                .await
                .unwrap();
            assert_eq!(rows.len(), 2);
        }

        #[tokio::test]
        async fn test_error_is_sticky_until_next_query() {
            let mut engine = people().await;
            assert!(engine.query("SELECT * FROM missing", &[], 0, 0).await.is_none());
            assert!(engine.last_error().is_some());
            assert_eq!(engine.last_query(), Some("SELECT * FROM missing"));

            assert!(engine.query("SELECT 1", &[], 0, 0).await.is_some());
            assert!(engine.last_error().is_none());
        }

        #[tokio::test]
        async fn test_stats_only_with_diagnostics() {
            let mut engine = people().await;
            engine.query("SELECT * FROM person", &[], 0, 0).await.unwrap();
            assert!(engine.stats().is_none());

            let config = DatabaseConfig::sqlite(":memory:").with_diagnostics(true);
            let mut engine = Engine::new(config).unwrap();
            engine.query("SELECT 1 AS one UNION ALL SELECT 2", &[], 0, 0).await.unwrap();
            let stats = engine.stats().unwrap();
            assert_eq!(stats.row_count, 2);
            assert!(stats.started_at.is_some());
            assert_eq!(stats.call_site.as_ref().unwrap().file, file!());
        }

        #[tokio::test]
        async fn test_failed_statement_clears_stats() {
            let config = DatabaseConfig::sqlite(":memory:").with_diagnostics(true);
            let mut engine = Engine::new(config).unwrap();
            engine.query("SELECT 1", &[], 0, 0).await.unwrap();
            assert!(engine.stats().is_some());

            assert!(engine.query("SELECT * FROM missing", &[], 0, 0).await.is_none());
            assert!(engine.stats().is_none());
        }

        #[tokio::test]
        async fn test_connect_keeps_open_connection() {
            let mut engine = people().await;
            assert!(engine.is_connected());
            assert!(engine.connect().await);

            // the in-memory database survives
            let rows = engine.query("SELECT count(*) AS n FROM person", &[], 0, 0).await;
            assert_eq!(rows.unwrap()[0]["n"], serde_json::json!(5));
            assert!(engine.last_error().is_none());
        }

        #[tokio::test]
        async fn test_list_tables() {
            let mut engine = people().await;
            let tables = engine.list_tables().await.unwrap();
            assert_eq!(tables, vec!["person".to_string()]);
        }

        #[tokio::test]
        async fn test_switch_database_reconnects() {
            let mut engine = people().await;
            assert!(engine.use_database(":memory:").await);
            assert!(engine.is_connected());
            // A fresh in-memory database has no tables.
            assert_eq!(engine.list_tables().await.unwrap(), Vec::<String>::new());
        }

        #[tokio::test]
        async fn test_generic_dialect_cannot_list_tables() {
            let mut engine = Engine::with_dialect(
                DatabaseConfig::sqlite(":memory:"),
                Box::new(crate::dialect::Generic),
            )
            .unwrap();
            assert!(engine.list_tables().await.is_none());
            assert!(engine.last_error().unwrap().contains("generic"));
        }
    }
}
