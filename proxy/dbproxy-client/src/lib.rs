//! dbproxy client library
//!
//! [`HttpConnection`] implements [`DatabaseDriver`] by sending each call as a
//! single HTTP request to a dbproxy server and rebuilding the driver-level
//! result from the reply.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use dbproxy_client::{ClientConfig, DatabaseDriver, HttpConnection};
//! use serde_json::json;
//!
//! let config = ClientConfig::from_url("http://db-proxy:8080/").with_token("secret");
//! let db = HttpConnection::connect(&config)?;
//! db.insert("insert into users (name) values (?)", &[json!("ada")]).await?;
//! println!("new id: {}", db.last_insert_id());
//! ```

pub mod coerce;
pub mod config;
pub mod connection;
pub mod last_insert_id;

pub use config::{ClientConfig, DriverFamily};
pub use connection::HttpConnection;
pub use last_insert_id::LastInsertIdCell;

// Re-export the driver surface so hosts only need this crate
pub use dbproxy_common::{DatabaseDriver, DbError, DbResult, InsertId, Row};
