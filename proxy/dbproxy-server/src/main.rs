use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use dbproxy_server::ServerConfig;

#[derive(Parser)]
#[command(name = "dbproxy-server")]
#[command(about = "Execute proxied database operations received over HTTP")]
struct Cli {
    /// Config file (defaults to DBPROXY_SERVER_CONFIG or <config dir>/dbproxy/server.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "DBPROXY_LISTEN")]
    listen: Option<SocketAddr>,

    /// SQLite database file, or :memory:
    #[arg(long)]
    database: Option<PathBuf>,

    /// Name reported by getDatabaseName
    #[arg(long)]
    database_name: Option<String>,

    /// Bearer token clients must send
    #[arg(long, env = "DBPROXY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Route accepting proxied requests
    #[arg(long)]
    path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dbproxy_common::init_tracing("dbproxy_server")?;

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load_from_path(path)?,
        None => ServerConfig::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}. Using default.", e);
            ServerConfig::default()
        }),
    };

    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(database) = cli.database {
        config.database.path = database;
    }
    if let Some(name) = cli.database_name {
        config.database.name = Some(name);
    }
    if let Some(token) = cli.token.filter(|t| !t.is_empty()) {
        config.token = Some(token);
    }
    if let Some(path) = cli.path {
        config.path = path;
    }

    tracing::info!("Starting dbproxy server");
    dbproxy_server::serve(config).await?;
    tracing::info!("Server shutting down");
    Ok(())
}
