//! Configuration for the HTTP connection

use anyhow::{Context, Result};
use dbproxy_common::{DbError, DbResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// SQL dialect of the database behind the proxy
///
/// The proxy never parses SQL; hosts use this to pick a query grammar and
/// result post-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverFamily {
    Mysql,
    Sqlite,
    Pgsql,
    Sqlsrv,
    #[default]
    #[serde(other)]
    Generic,
}

impl std::fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverFamily::Mysql => write!(f, "mysql"),
            DriverFamily::Sqlite => write!(f, "sqlite"),
            DriverFamily::Pgsql => write!(f, "pgsql"),
            DriverFamily::Sqlsrv => write!(f, "sqlsrv"),
            DriverFamily::Generic => write!(f, "generic"),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Full endpoint URL. Takes precedence over scheme/host/port/database.
    #[serde(default)]
    pub url: Option<String>,

    /// `http` or `https`
    /// Default: http
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Proxy server host
    #[serde(default)]
    pub host: Option<String>,

    /// Proxy server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Appended to the endpoint as its path
    #[serde(default)]
    pub database: Option<String>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<String>,

    /// Dialect of the remote database
    #[serde(default)]
    pub proxy_driver: DriverFamily,

    /// HTTP timeout per call in seconds
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl ClientConfig {
    /// Load configuration from file
    ///
    /// Looks for config in:
    /// 1. `DBPROXY_CLIENT_CONFIG` environment variable
    /// 2. `<config dir>/dbproxy/client.toml`
    pub fn load() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("DBPROXY_CLIENT_CONFIG") {
            PathBuf::from(path)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("dbproxy")
                .join("client.toml")
        };

        Self::load_from_path(&config_path)
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Create a config pointing at a full endpoint URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Endpoint every request is POSTed to
    ///
    /// Without an explicit `url` it is assembled as
    /// `scheme://host[:port][/database]`.
    pub fn endpoint(&self) -> DbResult<Url> {
        let raw = match &self.url {
            Some(url) => url.clone(),
            None => {
                let host = self
                    .host
                    .as_deref()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| DbError::Config("either url or host must be set".to_string()))?;

                let mut raw = format!("{}://{}", self.scheme, host);
                if let Some(port) = self.port {
                    raw.push_str(&format!(":{}", port));
                }
                if let Some(database) = self.database.as_deref().filter(|d| !d.is_empty()) {
                    raw.push('/');
                    raw.push_str(database.trim_start_matches('/'));
                }
                raw
            }
        };

        let url = Url::parse(&raw)
            .map_err(|e| DbError::Config(format!("invalid endpoint {:?}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(DbError::Config(format!(
                "unsupported scheme {:?}, expected http or https",
                other
            ))),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            scheme: default_scheme(),
            host: None,
            port: None,
            database: None,
            token: None,
            proxy_driver: DriverFamily::default(),
            timeout_secs: default_timeout(),
        }
    }
}
