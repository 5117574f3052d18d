//! Conversion Server Library
//!
//! Converts uploaded SVG files to PNG/JPEG rasters and Markdown documents to
//! paginated PDFs, and provides the client-side pieces (requesters, page
//! estimation, session state) that drive those conversions.
//!
//! ## Module Overview
//!
//! - `server`: axum routes for `/convert/svg` and `/convert/markdown`
//! - `converter`: rendering backend (resvg rasterizer, svg2pdf document writer)
//! - `markdown`: CommonMark parsing, HTML preview and page layout
//! - `dimensions` / `aspect`: SVG size extraction and locked-ratio editing
//! - `estimate`: pre- and post-render page estimates
//! - `validate`: upload type and size checks shared by client and server
//! - `client`: multipart requesters for both endpoints
//! - `session`: presentation state and its event reducer
//! - `job` / `telemetry`: per-conversion bookkeeping, tracing and OpenTelemetry
//! - `config`: environment-driven server settings
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use convert_server::{
//!     converter::{ConversionBackend, RenderBackend},
//!     options::{ImageFormat, SvgOptions},
//! };
//!
//! let backend = RenderBackend::new();
//! let png = backend.rasterize_svg(
//!     r#"<svg viewBox="0 0 100 50"><rect width="100" height="50"/></svg>"#,
//!     &SvgOptions {
//!         format: ImageFormat::Png,
//!         width: 200,
//!         height: 100,
//!         quality: None,
//!     },
//! );
//! assert!(png.is_ok());
//! ```

pub mod aspect;
pub mod client;
pub mod config;
pub mod converter;
pub mod dimensions;
pub mod error;
pub mod estimate;
pub mod job;
pub mod markdown;
pub mod options;
pub mod result;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod validate;
