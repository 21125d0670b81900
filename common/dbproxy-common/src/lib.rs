//! dbproxy common - pieces shared by the proxy client and server
//!
//! - **Protocol**: wire [`Request`]/[`Response`] types and the fixed [`Operation`] table
//! - **Driver**: the [`DatabaseDriver`] call surface both ends implement
//! - **Errors**: the [`DbError`] taxonomy and its wire envelope
//! - **Initialization**: [`init_tracing`] for the binaries
//!
//! # Example
//!
//! ```rust
//! use dbproxy_common::{Call, Operation};
//!
//! let request = Call::Unprepared { query: "vacuum".to_string() }.into_request();
//! assert_eq!(request.method, Operation::Unprepared.as_str());
//! ```

pub mod driver;
pub mod error;
pub mod init;
pub mod protocol;

// Re-export commonly used items at crate root
pub use driver::{dispatch, CallOutcome, DatabaseDriver};
pub use error::{BoxError, DbError, DbResult, AUTHORIZATION_EXCEPTION, BAD_AUTHORIZATION_TOKEN};
pub use init::init_tracing;
pub use protocol::{Call, ErrorEnvelope, InsertId, Operation, Request, Response, Row};

// Re-export async_trait for implementing DatabaseDriver
pub use async_trait::async_trait;
