//! The structured response of a conversion request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One converted file, inlined as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    /// `data:<mime>;base64,<payload>`
    pub url: String,
    pub filename: String,
    /// Decoded byte size of the payload.
    pub size: usize,
    /// Page count of a PDF result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

/// Response body for both conversion endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum DataUriError {
    #[error("not a base64 data URI")]
    NotBase64DataUri,
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl ConversionResult {
    pub fn ok(data: ResultData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl ResultData {
    /// Wraps converted bytes into a result with an inline data URI.
    pub fn inline(bytes: &[u8], mime: &str, filename: String, pages: Option<usize>) -> Self {
        Self {
            url: encode_data_uri(mime, bytes),
            filename,
            size: bytes.len(),
            pages,
        }
    }

    /// MIME type named in the data URI.
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.url.strip_prefix("data:")?;
        rest.split([';', ',']).next()
    }

    /// Decodes the data URI back into the converted bytes.
    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        decode_data_uri(&self.url)
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::NotBase64DataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUriError::NotBase64DataUri)?;
    if !header.ends_with(";base64") {
        return Err(DataUriError::NotBase64DataUri);
    }
    Ok(STANDARD.decode(payload)?)
}

/// Original name without its last extension, or `fallback` when empty.
pub fn file_stem(original: Option<&str>, fallback: &str) -> String {
    let name = original.unwrap_or_default();
    // Only strip an extension that follows the last path separator.
    let stem = match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    };
    if stem.is_empty() {
        fallback.to_string()
    } else {
        stem.to_string()
    }
}

/// `{stem}_{w}x{h}.{ext}` for raster output.
pub fn image_filename(original: Option<&str>, width: u32, height: u32, extension: &str) -> String {
    format!("{}_{}x{}.{}", file_stem(original, "image"), width, height, extension)
}

/// `{stem}.pdf` for document output.
pub fn pdf_filename(original: Option<&str>) -> String {
    format!("{}.pdf", file_stem(original, "document"))
}
