//! Configuration for the proxy server

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    /// Default: 127.0.0.1:8080
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Route that accepts proxied requests
    /// Default: /
    #[serde(default = "default_path")]
    pub path: String,

    /// Shared bearer token. When unset, every request is accepted.
    #[serde(default)]
    pub token: Option<String>,

    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Name reported by `getDatabaseName`
    /// Default: the database path
    #[serde(default)]
    pub name: Option<String>,

    /// How long a statement waits on a locked database, in seconds
    /// Default: 30
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_path() -> String {
    "/".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_busy_timeout() -> u64 {
    30
}

impl ServerConfig {
    /// Load configuration from file
    ///
    /// Looks for config in:
    /// 1. `DBPROXY_SERVER_CONFIG` environment variable
    /// 2. `<config dir>/dbproxy/server.toml`
    pub fn load() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("DBPROXY_SERVER_CONFIG") {
            PathBuf::from(path)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("dbproxy")
                .join("server.toml")
        };

        Self::load_from_path(&config_path)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.path.starts_with('/'),
            "route path must start with '/', got {:?}",
            self.path
        );
        ensure!(self.path != "/health", "route path /health is reserved");
        Ok(())
    }

    /// Create a config serving a specific database
    pub fn with_database(path: PathBuf) -> Self {
        Self {
            database: DatabaseConfig {
                path,
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }
}

impl DatabaseConfig {
    /// Name reported to clients
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            token: None,
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            name: None,
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}
