//! Remote executor: authenticate, dispatch, report
//!
//! Every inbound request is handled on its own. Faults of any kind end up in
//! the response's error envelope; nothing here produces a non-200 status.

use dbproxy_common::{Call, CallOutcome, DatabaseDriver, DbError, Request, Response};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::auth::TokenAuth;

/// Executes proxied operations against a real database driver
#[derive(Clone)]
pub struct RemoteExecutor {
    driver: Arc<dyn DatabaseDriver>,
    auth: TokenAuth,
}

impl RemoteExecutor {
    /// Create an executor over `driver`, optionally guarded by a bearer token
    pub fn new(driver: Arc<dyn DatabaseDriver>, token: Option<String>) -> Self {
        Self {
            driver,
            auth: TokenAuth::new(token),
        }
    }

    pub fn auth(&self) -> &TokenAuth {
        &self.auth
    }

    /// Handle a raw HTTP body with its `Authorization` header
    pub async fn handle(&self, authorization: Option<&str>, body: &[u8]) -> Response {
        if !self.auth.check(authorization) {
            warn!("rejected request with bad authorization token");
            return Response::unauthorized();
        }

        match serde_json::from_slice::<Request>(body) {
            Ok(request) => self.execute(request).await,
            Err(e) => {
                warn!("malformed request body: {}", e);
                Response::failure(&DbError::MalformedRequest(e.to_string()))
            }
        }
    }

    /// Execute an already authenticated request
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn execute(&self, request: Request) -> Response {
        let outcome = match Call::from_request(request) {
            Ok(call) => self.driver.run(call).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(CallOutcome { data, insert_id }) => {
                debug!(last_insert_id = ?insert_id, "operation succeeded");
                Response::success(data, insert_id)
            }
            Err(e) => {
                warn!(kind = e.kind(), "operation failed: {}", e.message());
                Response::failure(&e)
            }
        }
    }
}
