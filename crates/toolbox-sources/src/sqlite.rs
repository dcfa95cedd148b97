//! SQLite source.
//!
//! Wraps a single `rusqlite` connection behind a mutex. Statements run on the
//! blocking pool. Each call installs a progress handler bound to its own
//! cancellation token, so cancelling one caller never aborts another
//! caller's statement.

use crate::{BoxedSource, Source, SourceConfig, SourceError, SourceResult};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Kind discriminator for SQLite sources.
pub const SQLITE_SOURCE_KIND: &str = "sqlite";

/// In-memory database path.
const MEMORY_DATABASE: &str = ":memory:";

/// Virtual machine instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1000;

/// Configuration for a SQLite source.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`.
    pub database: String,
}

impl SqliteConfig {
    /// Create a configuration for the given database path.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_DATABASE)
    }
}

#[async_trait]
impl SourceConfig for SqliteConfig {
    fn kind(&self) -> &str {
        SQLITE_SOURCE_KIND
    }

    async fn initialize(&self, name: &str) -> SourceResult<BoxedSource> {
        let source = SqliteSource::open(name, &self.database).await?;
        Ok(Arc::new(source))
    }
}

/// A live SQLite connection.
pub struct SqliteSource {
    name: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("name", &self.name)
            .finish()
    }
}

impl SqliteSource {
    /// Open the database and verify it answers a trivial query.
    pub async fn open(name: &str, database: &str) -> SourceResult<Self> {
        if database.trim().is_empty() {
            return Err(SourceError::InvalidConfig(
                "`database` must not be empty".to_string(),
            ));
        }

        let path = database.to_string();
        let conn = tokio::task::spawn_blocking(move || -> SourceResult<Connection> {
            let conn = if path == MEMORY_DATABASE {
                Connection::open_in_memory()
            } else {
                Connection::open(&path)
            }
            .map_err(|e| SourceError::connection(format!("{path}: {e}")))?;

            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| SourceError::connection(format!("{path}: {e}")))?;
            Ok(conn)
        })
        .await
        .map_err(|e| SourceError::connection(format!("sqlite open task failed: {e}")))??;

        info!(source = %name, database = %database, "Opened sqlite source");

        Ok(Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }
}

#[async_trait]
impl Source for SqliteSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        SQLITE_SOURCE_KIND
    }

    async fn execute(
        &self,
        statement: &str,
        params: &[Value],
        cancel: &CancellationToken,
    ) -> SourceResult<Value> {
        debug!(source = %self.name, params = params.len(), "Executing sqlite statement");

        let conn = Arc::clone(&self.conn);
        let name = self.name.clone();
        let statement = statement.to_string();
        let params: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let cancel = cancel.clone();

        // Always awaited: the reported outcome must match what the database did.
        tokio::task::spawn_blocking(move || {
            run_statement(&conn, &name, &statement, &params, &cancel)
        })
        .await
        .map_err(|e| SourceError::execution(format!("sqlite task failed: {e}")))?
    }

    async fn close(&self) -> SourceResult<()> {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || -> SourceResult<bool> {
            let mut guard = conn
                .lock()
                .map_err(|_| SourceError::execution("sqlite connection lock poisoned"))?;
            Ok(guard.take().is_some())
        })
        .await
        .map_err(|e| SourceError::execution(format!("sqlite close task failed: {e}")))??;

        if closed {
            info!(source = %self.name, "Closed sqlite source");
        }
        Ok(())
    }
}

/// Run one statement on the locked connection.
///
/// A call cancelled while waiting for the lock never reaches `prepare`. Once
/// running, the progress handler aborts the statement when `cancel` fires and
/// SQLite rolls back its effects.
fn run_statement(
    conn: &Mutex<Option<Connection>>,
    name: &str,
    statement: &str,
    params: &[SqlValue],
    cancel: &CancellationToken,
) -> SourceResult<Value> {
    let guard = conn
        .lock()
        .map_err(|_| SourceError::execution("sqlite connection lock poisoned"))?;
    let conn = guard
        .as_ref()
        .ok_or_else(|| SourceError::Closed(name.to_string()))?;

    if cancel.is_cancelled() {
        debug!(source = %name, "Skipping statement cancelled before it started");
        return Err(SourceError::Cancelled);
    }

    let token = AssertUnwindSafe(cancel.clone());
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || token.is_cancelled()));
    let result = query(conn, statement, params);
    conn.progress_handler(0, None::<fn() -> bool>);

    result.map_err(|err| match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => SourceError::Cancelled,
        _ => SourceError::Sqlite(err),
    })
}

/// Prepare and run `statement`, collecting rows as JSON objects.
fn query(conn: &Connection, statement: &str, params: &[SqlValue]) -> rusqlite::Result<Value> {
    let mut stmt = conn.prepare(statement)?;
    if stmt.column_count() == 0 {
        stmt.execute(params_from_iter(params.iter()))?;
        return Ok(Value::Null);
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            object.insert(column.clone(), to_json_value(row.get_ref(idx)?));
        }
        out.push(Value::Object(object));
    }

    if out.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Array(out))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Composite values are stored as their JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn memory_source() -> SqliteSource {
        SqliteSource::open("test-db", MEMORY_DATABASE).await.unwrap()
    }

    async fn seeded_source() -> SqliteSource {
        let source = memory_source().await;
        let cancel = CancellationToken::new();
        source
            .execute(
                "CREATE TABLE t (id INTEGER, name TEXT, score REAL)",
                &[],
                &cancel,
            )
            .await
            .unwrap();
        source
            .execute(
                "INSERT INTO t VALUES (1, 'Alex', 1.5), (2, 'Alice', NULL)",
                &[],
                &cancel,
            )
            .await
            .unwrap();
        source
    }

    #[test]
    fn test_config_kind() {
        assert_eq!(SqliteConfig::in_memory().kind(), "sqlite");
        assert_eq!(SqliteConfig::in_memory().database, ":memory:");
    }

    #[test]
    fn test_config_deserialize() {
        let config: SqliteConfig =
            serde_json::from_value(json!({"kind": "sqlite", "database": "/tmp/x.db"})).unwrap();
        assert_eq!(config.database, "/tmp/x.db");
    }

    #[tokio::test]
    async fn test_initialize_from_config() {
        let source = SqliteConfig::in_memory().initialize("my-db").await.unwrap();
        assert_eq!(source.name(), "my-db");
        assert_eq!(source.kind(), "sqlite");
    }

    #[tokio::test]
    async fn test_open_empty_path_fails() {
        let err = SqliteSource::open("bad", "  ").await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_open_unreachable_path_fails() {
        let err = SqliteSource::open("bad", "/nonexistent-dir/sub/db.sqlite")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
        assert!(err.to_string().contains("unable to connect"));
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.db");
        let source = SqliteSource::open("file-db", path.to_str().unwrap())
            .await
            .unwrap();
        let rows = source
            .execute("SELECT 1 AS one", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rows, json!([{"one": 1}]));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_select_returns_rows_as_objects() {
        let source = seeded_source().await;
        let rows = source
            .execute(
                "SELECT id, name, score FROM t ORDER BY id",
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            rows,
            json!([
                {"id": 1, "name": "Alex", "score": 1.5},
                {"id": 2, "name": "Alice", "score": null}
            ])
        );
    }

    #[tokio::test]
    async fn test_params_bound_in_order() {
        let source = seeded_source().await;
        let rows = source
            .execute(
                "SELECT name FROM t WHERE id = ?1 AND name = ?2",
                &[json!(2), json!("Alice")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(rows, json!([{"name": "Alice"}]));
    }

    #[tokio::test]
    async fn test_empty_result_is_null() {
        let source = seeded_source().await;
        let rows = source
            .execute(
                "SELECT * FROM t WHERE id = ?1",
                &[json!(99)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(rows, Value::Null);
    }

    #[tokio::test]
    async fn test_statement_error_surfaces() {
        let source = memory_source().await;
        let err = source
            .execute("SELECT * FROM missing", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_wrong_param_count_is_error() {
        let source = seeded_source().await;
        let err = source
            .execute("SELECT * FROM t WHERE id = ?1", &[], &CancellationToken::new())
            .await;
        assert!(err.is_err());
    }

    /// Counts to `SLOW_COUNT`; runs long enough to be cancelled mid-flight.
    const SLOW_QUERY: &str = "WITH RECURSIVE c(x) AS \
         (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 2000000) \
         SELECT count(*) AS n FROM c";
    const SLOW_COUNT: i64 = 2_000_000;

    async fn row_count(source: &SqliteSource) -> Value {
        source
            .execute("SELECT count(*) AS n FROM t", &[], &CancellationToken::new())
            .await
            .unwrap()
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    #[tokio::test]
    async fn test_cancelled_write_is_not_committed() {
        let source = seeded_source().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source
            .execute("INSERT INTO t VALUES (3, 'Bo', 0.5)", &[], &cancel)
            .await;
        assert!(matches!(result, Err(SourceError::Cancelled)));
        assert_eq!(row_count(&source).await, json!([{"n": 2}]));
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_statement() {
        let source = memory_source().await;
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(50));

        let result = source.execute(SLOW_QUERY, &[], &cancel).await;
        assert!(matches!(result, Err(SourceError::Cancelled)));

        let rows = source
            .execute("SELECT 1 AS one", &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rows, json!([{"one": 1}]));
    }

    #[tokio::test]
    async fn test_cancel_leaves_other_callers_alone() {
        let source = Arc::new(seeded_source().await);

        let slow = {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                source
                    .execute(SLOW_QUERY, &[], &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(20));
        let write = source
            .execute("INSERT INTO t VALUES (3, 'Bo', 0.5)", &[], &cancel)
            .await;

        assert!(matches!(write, Err(SourceError::Cancelled)));
        assert_eq!(slow.await.unwrap().unwrap(), json!([{"n": SLOW_COUNT}]));
        assert_eq!(row_count(&source).await, json!([{"n": 2}]));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let source = memory_source().await;
        source.close().await.unwrap();
        source.close().await.unwrap();

        let err = source
            .execute("SELECT 1", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Closed(name) if name == "test-db"));
    }

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(7)), SqlValue::Integer(7));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(
            to_sql_value(&json!("x")),
            SqlValue::Text("x".to_string())
        );
        assert_eq!(
            to_sql_value(&json!(["a", 1])),
            SqlValue::Text("[\"a\",1]".to_string())
        );
    }
}
