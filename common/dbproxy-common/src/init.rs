//! Tracing initialization shared by the dbproxy binaries

use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize tracing/logging for a dbproxy binary
///
/// Logs go to stderr so the CLI can keep stdout for results. `RUST_LOG` is
/// read first, then `info` is enabled for `crate_name`, the shared protocol
/// crate and the HTTP trace layer.
///
/// Set `LOG_FORMAT=json` for structured JSON output.
///
/// # Example
///
/// ```rust,ignore
/// dbproxy_common::init_tracing("dbproxy_server")?;
/// ```
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for directive in default_directives(crate_name)? {
        filter = filter.add_directive(directive);
    }

    let registry = tracing_subscriber::registry().with(filter);

    if json_output() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

fn default_directives(crate_name: &str) -> anyhow::Result<Vec<Directive>> {
    let directives = [
        format!("{}=info", crate_name),
        "dbproxy_common=info".to_string(),
        "tower_http=info".to_string(),
    ];
    directives
        .iter()
        .map(|d| d.parse().map_err(anyhow::Error::from))
        .collect()
}

fn json_output() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
