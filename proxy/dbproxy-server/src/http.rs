//! HTTP endpoint for the proxy
//!
//! A single POST route carries every proxied call. Protocol-level failures
//! are reported in the JSON body, so the status is always 200.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use dbproxy_common::Response;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::executor::RemoteExecutor;
use crate::sqlite::SqliteConnection;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub auth_enabled: bool,
}

/// Start the proxy server described by `config`
pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let driver = SqliteConnection::open(&config.database)?;
    let executor = RemoteExecutor::new(Arc::new(driver), config.token.clone());

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!(
        "Serving database proxy on http://{}{}",
        listener.local_addr()?,
        config.path
    );
    if !executor.auth().is_enabled() {
        tracing::warn!("No token configured - every request will be accepted");
    }

    serve_with_listener(listener, executor, &config.path).await
}

/// Serve `executor` on an already bound listener
pub async fn serve_with_listener(
    listener: TcpListener,
    executor: RemoteExecutor,
    path: &str,
) -> Result<()> {
    let app = create_router(executor, path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Create the router with the proxy and health routes
pub fn create_router(executor: RemoteExecutor, path: &str) -> Router {
    Router::new()
        .route(path, post(proxy_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(executor))
}

/// Run one proxied operation
async fn proxy_handler(
    State(executor): State<Arc<RemoteExecutor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    Json(executor.handle(authorization, &body).await)
}

/// Health check endpoint
async fn health_check(State(executor): State<Arc<RemoteExecutor>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        auth_enabled: executor.auth().is_enabled(),
    })
}
