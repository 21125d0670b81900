//! dbproxy server library
//!
//! Receives proxied database operations over HTTP, checks the bearer token,
//! runs them against a real SQLite connection and reports the outcome with
//! the connection's last insert id.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use dbproxy_server::{create_router, RemoteExecutor, SqliteConnection};
//! use std::sync::Arc;
//!
//! let driver = SqliteConnection::open_in_memory("app")?;
//! let executor = RemoteExecutor::new(Arc::new(driver), Some("secret".to_string()));
//! let app = create_router(executor, "/");
//! ```

pub mod auth;
pub mod config;
pub mod executor;
pub mod http;
pub mod sqlite;

pub use auth::TokenAuth;
pub use config::{DatabaseConfig, ServerConfig};
pub use executor::RemoteExecutor;
pub use http::{create_router, serve, serve_with_listener};
pub use sqlite::SqliteConnection;
