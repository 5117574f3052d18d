//! Conversion Server
//!
//! Serves `POST /convert/svg` (SVG to PNG/JPEG via resvg) and
//! `POST /convert/markdown` (Markdown to paginated PDF via svg2pdf).
//! Results are returned inline as base64 data URIs; nothing is written to disk.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `BIND_ADDR`: Listen address (default: 0.0.0.0:3000)
//! - `RENDER_CONCURRENCY`: Concurrent renders (default: 4)
//! - `MAX_SVG_BYTES` / `MAX_MARKDOWN_BYTES`: Upload limits (default: 10 MiB / 5 MiB)
//! - `MAX_RASTER_DIMENSION`: Largest raster side in pixels (default: 10000)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: Log level (default: info)
//! - `LOG_FORMAT`: `json` for structured log lines

use anyhow::{Context, Result};
use convert_server::config::ServerConfig;
use convert_server::converter::RenderBackend;
use convert_server::server::{serve, AppState};
use convert_server::telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_logging();

    if let Err(e) = telemetry::init_telemetry() {
        warn!("Failed to initialize telemetry: {}", e);
    }

    info!("Starting conversion server");

    let config = ServerConfig::from_env();
    info!(
        "Configuration: bind_addr={}, concurrency={}, max_svg_bytes={}, max_markdown_bytes={}, max_raster_dimension={}",
        config.bind_addr,
        config.render_concurrency,
        config.limits.svg_bytes,
        config.limits.markdown_bytes,
        config.max_raster_dimension
    );

    // Font discovery walks the filesystem.
    let backend = tokio::task::spawn_blocking(RenderBackend::new)
        .await
        .context("Failed to load system fonts")?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    let state = AppState::new(Arc::new(backend), config);

    info!("Conversion server ready, press Ctrl+C to shutdown");
    serve(listener, state, shutdown_signal())
        .await
        .context("Server terminated unexpectedly")?;

    telemetry::shutdown_telemetry();
    info!("Conversion server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received shutdown signal, waiting for in-flight conversions...");
}
