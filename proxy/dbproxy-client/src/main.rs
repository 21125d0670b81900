use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use dbproxy_client::{ClientConfig, DatabaseDriver, HttpConnection};

#[derive(Parser)]
#[command(name = "dbproxy")]
#[command(about = "Run SQL against a database behind a dbproxy server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Proxy endpoint URL (overrides the config file)
    #[arg(long, env = "DBPROXY_URL")]
    url: Option<String>,

    /// Bearer token (overrides the config file)
    #[arg(long, env = "DBPROXY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file (defaults to DBPROXY_CLIENT_CONFIG or <config dir>/dbproxy/client.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct QueryArgs {
    /// SQL text
    query: String,

    /// Positional bindings as a JSON array, e.g. '[1, "ada"]'
    #[arg(long, short, default_value = "[]")]
    bindings: String,
}

impl QueryArgs {
    fn bindings(&self) -> Result<Vec<Value>> {
        serde_json::from_str(&self.bindings).context("--bindings must be a JSON array")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Return all matching rows
    Select(QueryArgs),
    /// Return the first matching row
    SelectOne(QueryArgs),
    /// Run an insert
    Insert(QueryArgs),
    /// Run an update and print affected rows
    Update(QueryArgs),
    /// Run a delete and print affected rows
    Delete(QueryArgs),
    /// Run any prepared statement
    Statement(QueryArgs),
    /// Run a prepared statement and print affected rows
    Affecting(QueryArgs),
    /// Run raw SQL without bindings
    Unprepared {
        /// SQL text
        query: String,
    },
    /// Print the remote database name
    DatabaseName,
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match (&cli.config, &cli.url) {
        (Some(path), _) => ClientConfig::load_from_path(path)?,
        (None, Some(url)) => ClientConfig::from_url(url.clone()),
        (None, None) => ClientConfig::load()?,
    };
    if let Some(url) = &cli.url {
        config.url = Some(url.clone());
    }
    if let Some(token) = cli.token.as_ref().filter(|t| !t.is_empty()) {
        config.token = Some(token.clone());
    }
    Ok(config)
}

/// Output for write commands: the driver result plus the connection's last insert id
fn with_insert_id(db: &HttpConnection, result: Value) -> Value {
    json!({"result": result, "lastInsertId": db.last_insert_id()})
}

#[tokio::main]
async fn main() -> Result<()> {
    dbproxy_common::init_tracing("dbproxy_client")?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let db = HttpConnection::connect(&config)?;

    let output = match &cli.command {
        Commands::Select(args) => json!(db.select(&args.query, &args.bindings()?, true).await?),
        Commands::SelectOne(args) => {
            json!(db.select_one(&args.query, &args.bindings()?, true).await?)
        }
        Commands::DatabaseName => json!(db.database_name().await?),
        Commands::Insert(args) => {
            let inserted = db.insert(&args.query, &args.bindings()?).await?;
            with_insert_id(&db, json!(inserted))
        }
        Commands::Update(args) => {
            let affected = db.update(&args.query, &args.bindings()?).await?;
            with_insert_id(&db, json!(affected))
        }
        Commands::Delete(args) => {
            let affected = db.delete(&args.query, &args.bindings()?).await?;
            with_insert_id(&db, json!(affected))
        }
        Commands::Statement(args) => {
            let ok = db.statement(&args.query, &args.bindings()?).await?;
            with_insert_id(&db, json!(ok))
        }
        Commands::Affecting(args) => {
            let affected = db.affecting_statement(&args.query, &args.bindings()?).await?;
            with_insert_id(&db, json!(affected))
        }
        Commands::Unprepared { query } => {
            let ok = db.unprepared(query).await?;
            with_insert_id(&db, json!(ok))
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
