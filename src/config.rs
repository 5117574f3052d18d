//! Environment-driven server configuration.
//!
//! Every setting has a default. A variable that is set but unparsable is
//! logged and replaced by its default rather than aborting startup.

use crate::validate::{UploadLimits, MAX_MARKDOWN_BYTES, MAX_SVG_BYTES};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RENDER_CONCURRENCY: usize = 4;
/// Largest width or height accepted for a raster output.
pub const DEFAULT_MAX_RASTER_DIMENSION: u32 = 10_000;

/// Allowance on top of the largest file limit for multipart framing and the
/// option fields.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub render_concurrency: usize,
    pub limits: UploadLimits,
    pub max_raster_dimension: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            render_concurrency: DEFAULT_RENDER_CONCURRENCY,
            limits: UploadLimits::default(),
            max_raster_dimension: DEFAULT_MAX_RASTER_DIMENSION,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `RENDER_CONCURRENCY`, `MAX_SVG_BYTES`,
    /// `MAX_MARKDOWN_BYTES` and `MAX_RASTER_DIMENSION`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bind_addr: setting(&lookup, "BIND_ADDR", defaults.bind_addr, |_| true),
            render_concurrency: setting(
                &lookup,
                "RENDER_CONCURRENCY",
                defaults.render_concurrency,
                |v| *v > 0,
            ),
            limits: UploadLimits {
                svg_bytes: setting(&lookup, "MAX_SVG_BYTES", MAX_SVG_BYTES, |v| *v > 0),
                markdown_bytes: setting(&lookup, "MAX_MARKDOWN_BYTES", MAX_MARKDOWN_BYTES, |v| {
                    *v > 0
                }),
            },
            max_raster_dimension: setting(
                &lookup,
                "MAX_RASTER_DIMENSION",
                defaults.max_raster_dimension,
                |v| *v > 0,
            ),
        }
    }

    /// Request body limit for the conversion routes.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.limits.largest())
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

fn setting<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(
                variable = key,
                value = %raw,
                default = %default,
                "Ignoring invalid configuration value"
            );
            default
        }
    }
}
