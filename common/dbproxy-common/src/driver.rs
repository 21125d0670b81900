//! Database driver capability interface
//!
//! [`DatabaseDriver`] is the call surface a host uses to talk to a database.
//! The HTTP client implements it by forwarding every call to the proxy
//! server, and the server implements it on top of a real connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbproxy_common::DatabaseDriver;
//!
//! async fn count_users(db: &dyn DatabaseDriver) -> dbproxy_common::DbResult<usize> {
//!     Ok(db.select("select id from users", &[], true).await?.len())
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DbResult;
use crate::protocol::{Call, InsertId, Row};

/// Wire result of one call, plus the insert id that call produced
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub data: Value,
    /// `None` when the call left the handle's last insert id unchanged
    pub insert_id: Option<InsertId>,
}

impl CallOutcome {
    /// Build an outcome from insert id readings taken before and after the call
    pub fn new(data: Value, before: InsertId, after: InsertId) -> Self {
        Self {
            data,
            insert_id: (after != before).then_some(after),
        }
    }
}

/// The database operations carried by the proxy protocol
///
/// Bindings are positional scalar values (null, bool, number or string).
/// Implementations must be `Send + Sync` so a single handle can serve
/// concurrent tasks.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Run a select and return the first row, if any
    async fn select_one(
        &self,
        query: &str,
        bindings: &[Value],
        use_read_pdo: bool,
    ) -> DbResult<Option<Row>>;

    /// Run a select and return all rows in order
    async fn select(&self, query: &str, bindings: &[Value], use_read_pdo: bool)
        -> DbResult<Vec<Row>>;

    /// Run an insert statement
    async fn insert(&self, query: &str, bindings: &[Value]) -> DbResult<bool>;

    /// Run an update statement and return the number of affected rows
    async fn update(&self, query: &str, bindings: &[Value]) -> DbResult<i64>;

    /// Run a delete statement and return the number of affected rows
    async fn delete(&self, query: &str, bindings: &[Value]) -> DbResult<i64>;

    /// Run any prepared statement
    async fn statement(&self, query: &str, bindings: &[Value]) -> DbResult<bool>;

    /// Run a prepared statement and return the number of affected rows
    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> DbResult<i64>;

    /// Run raw SQL without preparing it
    async fn unprepared(&self, query: &str) -> DbResult<bool>;

    /// Name of the connected database
    async fn database_name(&self) -> DbResult<String>;

    /// Auto-increment id left behind by the most recent insert
    fn last_insert_id(&self) -> InsertId;

    /// Run a decoded call and report the insert id it produced
    ///
    /// The default reads `last_insert_id` around [`dispatch`], so another
    /// user of the same handle can slip in between. Drivers that share one
    /// connection across requests should take both readings under the lock
    /// that runs the statement.
    async fn run(&self, call: Call) -> DbResult<CallOutcome> {
        let before = self.last_insert_id();
        let data = dispatch(self, call).await?;
        Ok(CallOutcome::new(data, before, self.last_insert_id()))
    }
}

/// Route a decoded call to `driver` and shape its result for the wire
pub async fn dispatch<D>(driver: &D, call: Call) -> DbResult<Value>
where
    D: DatabaseDriver + ?Sized,
{
    let data = match call {
        Call::SelectOne {
            query,
            bindings,
            use_read_pdo,
        } => match driver.select_one(&query, &bindings, use_read_pdo).await? {
            Some(row) => Value::Object(row),
            None => Value::Null,
        },
        Call::Select {
            query,
            bindings,
            use_read_pdo,
        } => {
            let rows = driver.select(&query, &bindings, use_read_pdo).await?;
            Value::Array(rows.into_iter().map(Value::Object).collect())
        }
        Call::Insert { query, bindings } => Value::Bool(driver.insert(&query, &bindings).await?),
        Call::Update { query, bindings } => Value::from(driver.update(&query, &bindings).await?),
        Call::Delete { query, bindings } => Value::from(driver.delete(&query, &bindings).await?),
        Call::Statement { query, bindings } => {
            Value::Bool(driver.statement(&query, &bindings).await?)
        }
        Call::AffectingStatement { query, bindings } => {
            Value::from(driver.affecting_statement(&query, &bindings).await?)
        }
        Call::Unprepared { query } => Value::Bool(driver.unprepared(&query).await?),
        Call::GetDatabaseName => Value::String(driver.database_name().await?),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_reports_changed_insert_id() {
        let outcome = CallOutcome::new(json!(true), InsertId::Unavailable, InsertId::Int(4));
        assert_eq!(outcome.insert_id, Some(InsertId::Int(4)));

        let outcome = CallOutcome::new(json!([]), InsertId::Int(4), InsertId::Int(4));
        assert_eq!(outcome.insert_id, None);
    }
}
