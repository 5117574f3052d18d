//! Error taxonomy for conversion requests.
//!
//! Input errors are answered with 400 and a specific message. Upload
//! validation failures are application errors and travel as a normal
//! `success: false` body. Anything that goes wrong inside a render backend
//! collapses into one generic message and a 500.

use crate::validate::UploadError;
use axum::http::StatusCode;
use thiserror::Error;

/// Message shown for every rendering failure.
pub const CONVERSION_FAILED_MESSAGE: &str = "An error occurred during conversion";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("No file was provided")]
    MissingFile,

    #[error("Please specify both width and height")]
    MissingDimensions,

    #[error("Please specify both width and height for a custom page size")]
    MissingCustomSize,

    #[error("Invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Requested size {width}x{height} exceeds the maximum of {max}px per side")]
    DimensionTooLarge { width: u32, height: u32, max: u32 },

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Rejected(#[from] UploadError),

    #[error("Conversion failed: {0:#}")]
    Render(anyhow::Error),
}

impl ConvertError {
    /// HTTP status the error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ConvertError::MissingFile
            | ConvertError::MissingDimensions
            | ConvertError::MissingCustomSize
            | ConvertError::InvalidField { .. }
            | ConvertError::DimensionTooLarge { .. }
            | ConvertError::Malformed(_) => StatusCode::BAD_REQUEST,
            ConvertError::Rejected(_) => StatusCode::OK,
            ConvertError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user. Render details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::Render(_) => CONVERSION_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// A specialized Result type for conversion requests.
pub type Result<T> = std::result::Result<T, ConvertError>;
