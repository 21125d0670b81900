//! SQLite-backed database driver
//!
//! The real connection the executor routes to. rusqlite connections are not
//! `Sync`, so the handle lives behind a mutex.

use anyhow::{Context, Result};
use dbproxy_common::{
    async_trait, Call, CallOutcome, DatabaseDriver, DbError, DbResult, InsertId, Row,
};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// Fault name for errors raised by SQLite itself
const QUERY_EXCEPTION: &str = "QueryException";

/// SQLite connection implementing the proxied driver surface
#[derive(Clone)]
pub struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl SqliteConnection {
    /// Open the database described by `config`
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory().context("Failed to create in-memory database")?
        } else {
            Connection::open(&config.path)
                .with_context(|| format!("Failed to open database at {:?}", config.path))?
        };

        conn.busy_timeout(Duration::from_secs(config.busy_timeout_secs))?;

        tracing::info!("Database opened at {:?}", config.path);
        Ok(Self::from_connection(conn, config.display_name()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory(name: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Ok(Self::from_connection(conn, name))
    }

    /// Wrap an already opened connection
    pub fn from_connection(conn: Connection, name: impl Into<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            name: name.into(),
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DbError::execution("ConnectionException", "connection lock poisoned"))
    }
}

#[async_trait]
impl DatabaseDriver for SqliteConnection {
    async fn select_one(
        &self,
        query: &str,
        bindings: &[Value],
        _use_read_pdo: bool,
    ) -> DbResult<Option<Row>> {
        Ok(query_rows(&*self.lock()?, query, bindings)?.into_iter().next())
    }

    async fn select(
        &self,
        query: &str,
        bindings: &[Value],
        _use_read_pdo: bool,
    ) -> DbResult<Vec<Row>> {
        // single connection, so reads and writes share it
        query_rows(&*self.lock()?, query, bindings)
    }

    async fn insert(&self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        self.statement(query, bindings).await
    }

    async fn update(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        self.affecting_statement(query, bindings).await
    }

    async fn delete(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        self.affecting_statement(query, bindings).await
    }

    async fn statement(&self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        execute(&*self.lock()?, query, bindings)?;
        Ok(true)
    }

    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        execute(&*self.lock()?, query, bindings)
    }

    async fn unprepared(&self, query: &str) -> DbResult<bool> {
        self.lock()?.execute_batch(query).map_err(query_error)?;
        Ok(true)
    }

    async fn database_name(&self) -> DbResult<String> {
        Ok(self.name.clone())
    }

    fn last_insert_id(&self) -> InsertId {
        match self.lock() {
            Ok(conn) => insert_id(conn.last_insert_rowid()),
            Err(_) => InsertId::Unavailable,
        }
    }

    /// Run `call` and read the insert id under a single lock
    ///
    /// The connection is shared by every request, so only an id this call
    /// changed is reported back.
    async fn run(&self, call: Call) -> DbResult<CallOutcome> {
        let conn = self.lock()?;
        let before = conn.last_insert_rowid();

        let data = match call {
            Call::SelectOne {
                query, bindings, ..
            } => match query_rows(&conn, &query, &bindings)?.into_iter().next() {
                Some(row) => Value::Object(row),
                None => Value::Null,
            },
            Call::Select {
                query, bindings, ..
            } => {
                let rows = query_rows(&conn, &query, &bindings)?;
                Value::Array(rows.into_iter().map(Value::Object).collect())
            }
            Call::Insert { query, bindings } | Call::Statement { query, bindings } => {
                execute(&conn, &query, &bindings)?;
                Value::Bool(true)
            }
            Call::Update { query, bindings }
            | Call::Delete { query, bindings }
            | Call::AffectingStatement { query, bindings } => {
                Value::from(execute(&conn, &query, &bindings)?)
            }
            Call::Unprepared { query } => {
                conn.execute_batch(&query).map_err(query_error)?;
                Value::Bool(true)
            }
            Call::GetDatabaseName => Value::String(self.name.clone()),
        };

        let after = conn.last_insert_rowid();
        Ok(CallOutcome::new(data, insert_id(before), insert_id(after)))
    }
}

fn insert_id(rowid: i64) -> InsertId {
    match rowid {
        0 => InsertId::Unavailable,
        id => InsertId::Int(id),
    }
}

fn execute(conn: &Connection, query: &str, bindings: &[Value]) -> DbResult<i64> {
    let params = sql_params(bindings)?;
    let changed = conn
        .execute(query, params_from_iter(params.iter()))
        .map_err(query_error)?;
    Ok(changed as i64)
}

fn query_rows(conn: &Connection, query: &str, bindings: &[Value]) -> DbResult<Vec<Row>> {
    let params = sql_params(bindings)?;
    let read = || -> rusqlite::Result<Vec<Row>> {
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                record.insert(column.clone(), json_value(value));
            }
            result.push(record);
        }
        Ok(result)
    };
    read().map_err(query_error)
}

/// Convert JSON bindings into SQLite values
fn sql_params(bindings: &[Value]) -> DbResult<Vec<SqlValue>> {
    bindings
        .iter()
        .enumerate()
        .map(|(i, binding)| match binding {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(int) => Ok(SqlValue::Integer(int)),
                None => Ok(SqlValue::Real(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(DbError::InvalidParams(format!(
                "binding {} is not a scalar value",
                i + 1
            ))),
        })
        .collect()
}

/// Convert a SQLite value into its JSON form
fn json_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn query_error(e: rusqlite::Error) -> DbError {
    match e {
        rusqlite::Error::InvalidParameterCount(given, expected) => DbError::InvalidParams(format!(
            "query expects {} binding(s), got {}",
            expected, given
        )),
        other => DbError::execution(QUERY_EXCEPTION, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn users() -> SqliteConnection {
        let db = SqliteConnection::open_in_memory("test").unwrap();
        db.unprepared(
            "CREATE TABLE users (
                 id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, score REAL
             );
             INSERT INTO users (name, score) VALUES ('ada', 1.5), ('bob', NULL);",
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_select_rows_in_column_order() {
        let db = users().await;
        let rows = db
            .select("SELECT id, name, score FROM users ORDER BY id", &[], true)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"id": 1, "name": "ada", "score": 1.5})
        );
        assert_eq!(rows[1]["score"], Value::Null);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["id", "name", "score"]);
    }

    #[tokio::test]
    async fn test_select_one() {
        let db = users().await;
        let row = db
            .select_one("SELECT name FROM users WHERE id = ?", &[json!(2)], true)
            .await
            .unwrap();
        assert_eq!(row.unwrap()["name"], json!("bob"));

        let missing = db
            .select_one("SELECT name FROM users WHERE id = ?", &[json!(99)], true)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_insert_sets_last_insert_id() {
        let db = users().await;
        assert!(db
            .insert("INSERT INTO users (name) VALUES (?)", &[json!("cy")])
            .await
            .unwrap());
        assert_eq!(db.last_insert_id(), InsertId::Int(3));
    }

    #[tokio::test]
    async fn test_fresh_connection_has_no_insert_id() {
        let db = SqliteConnection::open_in_memory("empty").unwrap();
        assert_eq!(db.last_insert_id(), InsertId::Unavailable);
    }

    #[tokio::test]
    async fn test_run_reports_only_ids_it_produced() {
        let db = users().await;
        let outcome = db
            .run(Call::Insert {
                query: "INSERT INTO users (name) VALUES (?)".to_string(),
                bindings: vec![json!("cy")],
            })
            .await
            .unwrap();
        assert_eq!(outcome.data, json!(true));
        assert_eq!(outcome.insert_id, Some(InsertId::Int(3)));

        let outcome = db
            .run(Call::Select {
                query: "SELECT name FROM users WHERE id = ?".to_string(),
                bindings: vec![json!(3)],
                use_read_pdo: true,
            })
            .await
            .unwrap();
        assert_eq!(outcome.data, json!([{"name": "cy"}]));
        assert_eq!(outcome.insert_id, None);

        let outcome = db
            .run(Call::Update {
                query: "UPDATE users SET score = 0".to_string(),
                bindings: vec![],
            })
            .await
            .unwrap();
        assert_eq!(outcome.data, json!(3));
        assert_eq!(outcome.insert_id, None);
    }

    #[tokio::test]
    async fn test_run_matches_driver_methods() {
        let db = users().await;
        let one = db
            .run(Call::SelectOne {
                query: "SELECT name FROM users ORDER BY id".to_string(),
                bindings: vec![],
                use_read_pdo: true,
            })
            .await
            .unwrap();
        assert_eq!(one.data, json!({"name": "ada"}));

        let name = db.run(Call::GetDatabaseName).await.unwrap();
        assert_eq!(name.data, json!("test"));

        let err = db
            .run(Call::Unprepared {
                query: "DROP TABLE nowhere".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "QueryException");
    }

    #[tokio::test]
    async fn test_update_and_delete_count_rows() {
        let db = users().await;
        let updated = db
            .update("UPDATE users SET score = ?", &[json!(2)])
            .await
            .unwrap();
        assert_eq!(updated, 2);
        let deleted = db
            .delete("DELETE FROM users WHERE name = ?", &[json!("ada")])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        let none = db
            .affecting_statement("DELETE FROM users WHERE id = ?", &[json!(100)])
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_bool_bindings_become_integers() {
        let db = users().await;
        let rows = db.select("SELECT ? AS flag", &[json!(true)], true).await.unwrap();
        assert_eq!(rows[0]["flag"], json!(1));
    }

    #[tokio::test]
    async fn test_sql_error_is_query_exception() {
        let db = users().await;
        let err = db.select("SELECT * FROM missing", &[], true).await.unwrap_err();
        assert_eq!(err.kind(), "QueryException");
        assert!(err.message().contains("missing"));
    }

    #[tokio::test]
    async fn test_non_scalar_binding_rejected() {
        let db = users().await;
        let err = db
            .insert("INSERT INTO users (name) VALUES (?)", &[json!(["x"])])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_binding_count_mismatch() {
        let db = users().await;
        let err = db
            .select("SELECT * FROM users WHERE id = ?", &[], true)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_database_name_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("app.db"),
            name: Some("app".to_string()),
            busy_timeout_secs: 1,
        };
        let db = SqliteConnection::open(&config).unwrap();
        assert_eq!(db.database_name().await.unwrap(), "app");
        assert!(config.path.exists());
    }
}
