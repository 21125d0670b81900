//! Database connection that forwards every call over HTTP
//!
//! Each supported call is one POST to the proxy endpoint. Transaction
//! control, cursors and dry runs fail locally: consecutive HTTP requests
//! share no session on the server to anchor them to.

use dbproxy_common::{
    async_trait, Call, DatabaseDriver, DbError, DbResult, InsertId, Response, Row,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::coerce;
use crate::config::{ClientConfig, DriverFamily};
use crate::last_insert_id::LastInsertIdCell;

/// Database driver backed by a remote dbproxy server
pub struct HttpConnection {
    client: reqwest::Client,
    endpoint: Url,
    driver_family: DriverFamily,
    last_insert_id: LastInsertIdCell,
}

impl HttpConnection {
    /// Build a connection from explicit configuration
    ///
    /// No request is made until the first call.
    pub fn connect(config: &ClientConfig) -> DbResult<Self> {
        let endpoint = config.endpoint()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| DbError::Config(format!("invalid token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DbError::Config(format!("failed to build HTTP client: {}", e)))?;

        debug!(endpoint = %endpoint, driver = %config.proxy_driver, "created proxy connection");
        Ok(Self {
            client,
            endpoint,
            driver_family: config.proxy_driver,
            last_insert_id: LastInsertIdCell::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Dialect of the remote database, for grammar selection
    pub fn driver_family(&self) -> DriverFamily {
        self.driver_family
    }

    /// Overwrite the locally held last insert id
    pub fn set_last_insert_id(&self, id: InsertId) {
        self.last_insert_id.set(id);
    }

    /// Send one call and return the response data
    #[instrument(skip_all, fields(method = %call.operation()))]
    async fn request(&self, call: Call) -> DbResult<Value> {
        let request = call.into_request();
        debug!("sending proxied call");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("transport failure: {}", e);
                DbError::Transport(Box::new(e))
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(%status, "proxy endpoint answered with a non-200 status");
            return Err(DbError::MalformedResponse(format!(
                "HTTP {} from proxy endpoint",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DbError::Transport(Box::new(e)))?;

        let Response {
            data,
            error,
            last_insert_id,
        } = serde_json::from_slice(&body).map_err(|e| {
            warn!("unreadable response body: {}", e);
            DbError::MalformedResponse(e.to_string())
        })?;

        if let Some(envelope) = error {
            warn!(name = %envelope.name, "remote operation failed: {}", envelope.message);
            return Err(envelope.into());
        }

        if let Some(id) = last_insert_id {
            self.last_insert_id.set(id);
        }
        Ok(data.unwrap_or(Value::Null))
    }

    // ------------------------------------------------------------------------
    // Unsupported over a stateless transport
    // ------------------------------------------------------------------------

    pub fn begin_transaction(&self) -> DbResult<()> {
        Err(unsupported("beginTransaction"))
    }

    pub fn commit(&self) -> DbResult<()> {
        Err(unsupported("commit"))
    }

    pub fn roll_back(&self, _to_level: Option<u32>) -> DbResult<()> {
        Err(unsupported("rollBack"))
    }

    pub fn transaction_level(&self) -> DbResult<u32> {
        Err(unsupported("transactionLevel"))
    }

    /// Run `callback` inside a transaction. Always fails.
    pub fn transaction<T, F>(&self, _callback: F, _attempts: u32) -> DbResult<T>
    where
        F: FnOnce(&Self) -> DbResult<T>,
    {
        Err(unsupported("transaction"))
    }

    /// Collect the queries `callback` would run. Always fails.
    pub fn pretend<F>(&self, _callback: F) -> DbResult<Vec<String>>
    where
        F: FnOnce(&Self),
    {
        Err(unsupported("pretend"))
    }

    /// Iterate rows one at a time. Always fails.
    pub fn cursor(
        &self,
        _query: &str,
        _bindings: &[Value],
        _use_read_pdo: bool,
    ) -> DbResult<std::vec::IntoIter<Row>> {
        Err(unsupported("cursor"))
    }
}

fn unsupported(operation: &'static str) -> DbError {
    debug!(operation, "rejected unsupported operation");
    DbError::Unsupported(operation)
}

#[async_trait]
impl DatabaseDriver for HttpConnection {
    async fn select_one(
        &self,
        query: &str,
        bindings: &[Value],
        use_read_pdo: bool,
    ) -> DbResult<Option<Row>> {
        let data = self
            .request(Call::SelectOne {
                query: query.to_string(),
                bindings: bindings.to_vec(),
                use_read_pdo,
            })
            .await?;

        match data {
            Value::Null => Ok(None),
            Value::Object(row) => Ok(Some(row)),
            other => Err(DbError::MalformedResponse(format!(
                "selectOne expected a row or null, got {}",
                other
            ))),
        }
    }

    async fn select(
        &self,
        query: &str,
        bindings: &[Value],
        use_read_pdo: bool,
    ) -> DbResult<Vec<Row>> {
        let data = self
            .request(Call::Select {
                query: query.to_string(),
                bindings: bindings.to_vec(),
                use_read_pdo,
            })
            .await?;

        match data {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(DbError::MalformedResponse(format!(
                        "select expected rows, got {}",
                        other
                    ))),
                })
                .collect(),
            other => Err(DbError::MalformedResponse(format!(
                "select expected a list of rows, got {}",
                other
            ))),
        }
    }

    async fn insert(&self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        let data = self
            .request(Call::Insert {
                query: query.to_string(),
                bindings: bindings.to_vec(),
            })
            .await?;
        Ok(coerce::to_bool(&data))
    }

    async fn update(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        let data = self
            .request(Call::Update {
                query: query.to_string(),
                bindings: bindings.to_vec(),
            })
            .await?;
        Ok(coerce::to_int(&data))
    }

    async fn delete(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        let data = self
            .request(Call::Delete {
                query: query.to_string(),
                bindings: bindings.to_vec(),
            })
            .await?;
        Ok(coerce::to_int(&data))
    }

    async fn statement(&self, query: &str, bindings: &[Value]) -> DbResult<bool> {
        let data = self
            .request(Call::Statement {
                query: query.to_string(),
                bindings: bindings.to_vec(),
            })
            .await?;
        Ok(data == Value::Bool(true))
    }

    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> DbResult<i64> {
        let data = self
            .request(Call::AffectingStatement {
                query: query.to_string(),
                bindings: bindings.to_vec(),
            })
            .await?;
        Ok(coerce::to_int(&data))
    }

    async fn unprepared(&self, query: &str) -> DbResult<bool> {
        let data = self
            .request(Call::Unprepared {
                query: query.to_string(),
            })
            .await?;
        Ok(data == Value::Bool(true))
    }

    async fn database_name(&self) -> DbResult<String> {
        let data = self.request(Call::GetDatabaseName).await?;
        Ok(coerce::to_string(&data))
    }

    fn last_insert_id(&self) -> InsertId {
        self.last_insert_id.get()
    }
}
