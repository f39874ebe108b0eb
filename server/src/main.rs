//! Prosody Server
//!
//! An HTTP server that asks a generative model how to voice a piece of text
//! and returns the text split into segments with pitch, rate and volume.
//!
//! Usage:
//!   GEMINI_API_KEY=... cargo run --release -p prosody-server
//!
//! The server listens on http://127.0.0.1:3000 by default and serves
//! `POST /api/generateProsody` with a JSON body `{"text": "..."}`.

mod config;
mod error;
mod model;
mod routes;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use config::Config;
use model::GeminiClient;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prosody_server=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    info!("Using model {} at {}", config.model, config.base_url);
    let model = GeminiClient::new(&config.base_url, &config.model, &config.api_key);
    let app = routes::create_router(AppState::new(Arc::new(model)));

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!("Prosody server listening on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// Resolves once `signal` fires. A signal that cannot be installed never
/// resolves, so the server keeps running.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
