//! Conversion requesters: multipart uploads to the conversion endpoints.
//!
//! Uploads are validated locally before any request is made. Whatever JSON
//! [`ConversionResult`] the server answers with is handed back unchanged,
//! whatever the status code; only transport failures and bodies that are not
//! a result become errors.

use crate::options::{MarkdownOptions, PageSize, SvgOptions};
use crate::result::ConversionResult;
use crate::validate::{validate_upload, FileCategory, UploadError, UploadLimits};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rejected(#[from] UploadError),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

/// A file ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_for_name(&name).to_string();
        Ok(Self { name, mime, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Text content, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn validate(&self, category: FileCategory, limits: &UploadLimits) -> Result<(), UploadError> {
        validate_upload(category, &self.name, &self.mime, self.size(), limits)
    }

    /// An untyped upload goes out without a part content type, the way a
    /// browser sends a file it could not type.
    fn part(&self) -> Result<Part, ClientError> {
        let part = Part::bytes(self.bytes.clone()).file_name(self.name.clone());
        if self.mime.is_empty() {
            Ok(part)
        } else {
            Ok(part.mime_str(&self.mime)?)
        }
    }
}

/// MIME type for the extensions this service accepts; empty otherwise.
pub fn mime_for_name(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("svg") => "image/svg+xml",
        Some("md") | Some("markdown") => "text/markdown",
        _ => "",
    }
}

#[derive(Debug, Clone)]
pub struct ConversionClient {
    http: reqwest::Client,
    base_url: String,
    limits: UploadLimits,
}

impl ConversionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limits: UploadLimits::default(),
        }
    }

    /// Overrides the client-side size limits.
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Uploads an SVG for rasterization.
    ///
    /// # Arguments
    ///
    /// * `upload` - The SVG file; validated locally before any request
    /// * `options` - Output format, pixel size and optional JPEG quality
    ///
    /// # Returns
    ///
    /// The server's [`ConversionResult`], including `success: false` bodies
    /// sent with a 4xx/5xx status.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rejected`] without touching the network when
    /// validation fails, [`ClientError::Transport`] when the request fails, and
    /// [`ClientError::UnexpectedResponse`] when the body is not a result.
    pub async fn convert_svg(
        &self,
        upload: &Upload,
        options: &SvgOptions,
    ) -> Result<ConversionResult, ClientError> {
        upload.validate(FileCategory::Svg, &self.limits)?;

        let mut form = Form::new()
            .part("file", upload.part()?)
            .text("format", options.format.to_string())
            .text("width", options.width.to_string())
            .text("height", options.height.to_string());
        if let Some(quality) = options.quality {
            form = form.text("quality", quality.to_string());
        }

        self.post("/convert/svg", form).await
    }

    /// Uploads a Markdown document for PDF rendering.
    ///
    /// `width`/`height` are only sent for a custom page size.
    ///
    /// # Errors
    ///
    /// Same as [`ConversionClient::convert_svg`].
    pub async fn convert_markdown(
        &self,
        upload: &Upload,
        options: &MarkdownOptions,
    ) -> Result<ConversionResult, ClientError> {
        upload.validate(FileCategory::Markdown, &self.limits)?;

        let mut form = Form::new()
            .part("file", upload.part()?)
            .text("pageSize", options.page_size.as_str().to_string());
        if options.page_size == PageSize::Custom {
            if let Some(width) = options.width {
                form = form.text("width", width.to_string());
            }
            if let Some(height) = options.height {
                form = form.text("height", height.to_string());
            }
        }

        self.post("/convert/markdown", form).await
    }

    async fn post(&self, path: &str, form: Form) -> Result<ConversionResult, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Submitting conversion");

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        serde_json::from_slice::<ConversionResult>(&body).map_err(|_| {
            ClientError::UnexpectedResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(BODY_PREVIEW_CHARS)
                    .collect(),
            }
        })
    }
}
