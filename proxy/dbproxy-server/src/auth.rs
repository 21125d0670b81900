//! Bearer token authentication
//!
//! Auth is optional: with no token configured every request is allowed.

/// Shared-secret check applied before any request is dispatched
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    token: Option<String>,
}

impl TokenAuth {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Validate the raw `Authorization` header value
    ///
    /// A missing header counts as an empty credential. A leading `Bearer `
    /// is stripped, the rest must equal the configured token exactly.
    pub fn check(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };

        let header = authorization.unwrap_or("");
        let given = header.strip_prefix("Bearer ").unwrap_or(header);
        given == expected
    }
}
