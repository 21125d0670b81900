//! Error taxonomy shared by both ends of the proxy
//!
//! Server-side faults are flattened into an [`ErrorEnvelope`] before they
//! cross the wire. The client turns any envelope it receives back into
//! [`DbError::Remote`], keeping only the original name and message.

use crate::protocol::ErrorEnvelope;

/// Boxed error used for transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for driver and proxy operations
pub type DbResult<T> = Result<T, DbError>;

/// Wire name of the authorization fault
pub const AUTHORIZATION_EXCEPTION: &str = "AuthorizationException";

/// Message sent with an authorization fault
pub const BAD_AUTHORIZATION_TOKEN: &str = "Bad authorization token";

/// Errors raised anywhere in the proxy
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Bearer token missing or not matching the configured one
    #[error("Bad authorization token")]
    Unauthorized,

    /// Method name is not part of the operation table
    #[error("Method: \"{0}\" does not exist.")]
    UnknownOperation(String),

    /// Positional params do not match the operation's argument shape
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Request body is not a valid wire request
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The underlying driver call failed
    #[error("{name}: {message}")]
    Execution {
        /// Fault kind reported by the driver
        name: String,
        /// Driver error description
        message: String,
    },

    /// The remote side reported an error envelope
    #[error("remote operation failed: {name}: {message}")]
    Remote {
        /// Fault kind reported by the server
        name: String,
        /// Fault description reported by the server
        message: String,
    },

    /// Response body could not be read as a wire response
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Operation has no meaning over a stateless transport
    #[error("operation not supported over this transport: {0}")]
    Unsupported(&'static str),

    /// Connection refused, timeout, or another HTTP-level failure
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Build an execution fault from any displayable driver error
    pub fn execution(name: impl Into<String>, message: impl ToString) -> Self {
        DbError::Execution {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Name of the fault kind as it appears on the wire
    pub fn kind(&self) -> &str {
        match self {
            DbError::Unauthorized => AUTHORIZATION_EXCEPTION,
            DbError::UnknownOperation(_) => "UnknownOperationException",
            DbError::InvalidParams(_) => "InvalidParamsException",
            DbError::MalformedRequest(_) => "MalformedRequestException",
            DbError::Execution { name, .. } | DbError::Remote { name, .. } => name.as_str(),
            DbError::MalformedResponse(_) => "MalformedResponseException",
            DbError::Unsupported(_) => "UnsupportedOperationException",
            DbError::Transport(_) => "TransportException",
            DbError::Config(_) => "ConfigException",
        }
    }

    /// Fault description without the kind prefix
    pub fn message(&self) -> String {
        match self {
            DbError::Execution { message, .. } | DbError::Remote { message, .. } => {
                message.clone()
            }
            DbError::InvalidParams(msg)
            | DbError::MalformedRequest(msg)
            | DbError::MalformedResponse(msg)
            | DbError::Config(msg) => msg.clone(),
            DbError::Unsupported(op) => format!("{} is not supported over this transport", op),
            DbError::Transport(source) => source.to_string(),
            other => other.to_string(),
        }
    }

    /// Convert into the `{name, message}` envelope sent on the wire
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            name: self.kind().to_string(),
            message: self.message(),
        }
    }

    /// True for failures that happened before a response body was interpreted
    pub fn is_transport(&self) -> bool {
        matches!(self, DbError::Transport(_) | DbError::MalformedResponse(_))
    }
}

impl From<ErrorEnvelope> for DbError {
    fn from(envelope: ErrorEnvelope) -> Self {
        DbError::Remote {
            name: envelope.name,
            message: envelope.message,
        }
    }
}
