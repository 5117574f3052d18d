//! Conversion options carried by each request.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JPEG quality applied when a request omits it.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Raster output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Jpeg => write!(f, "jpeg"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            _ => Err(ConvertError::InvalidField {
                field: "format",
                value: s.to_string(),
            }),
        }
    }
}

/// Physical page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensionsMm {
    pub width: f64,
    pub height: f64,
}

/// Named paper sizes plus a user-defined size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    B4,
    B5,
    Letter,
    Legal,
    Tabloid,
    #[serde(rename = "custom")]
    Custom,
}

impl PageSize {
    pub const NAMED: [PageSize; 8] = [
        PageSize::A3,
        PageSize::A4,
        PageSize::A5,
        PageSize::B4,
        PageSize::B5,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Tabloid,
    ];

    /// Table dimensions for named sizes; `None` for [`PageSize::Custom`].
    pub fn dimensions(&self) -> Option<PageDimensionsMm> {
        let (width, height) = match self {
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::B4 => (250.0, 353.0),
            PageSize::B5 => (176.0, 250.0),
            PageSize::Letter => (216.0, 279.0),
            PageSize::Legal => (216.0, 356.0),
            PageSize::Tabloid => (279.0, 432.0),
            PageSize::Custom => return None,
        };
        Some(PageDimensionsMm { width, height })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::B4 => "B4",
            PageSize::B5 => "B5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::Tabloid => "Tabloid",
            PageSize::Custom => "custom",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSize {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PageSize::NAMED
            .iter()
            .chain(std::iter::once(&PageSize::Custom))
            .find(|size| size.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| ConvertError::InvalidField {
                field: "pageSize",
                value: s.to_string(),
            })
    }
}

/// Options for an SVG to raster conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvgOptions {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// JPEG quality 1-100; ignored for PNG.
    pub quality: Option<u8>,
}

impl SvgOptions {
    pub fn jpeg_quality(&self) -> u8 {
        self.quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100)
    }
}

/// Options for a Markdown to PDF conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownOptions {
    pub page_size: PageSize,
    /// Millimetres; required for [`PageSize::Custom`].
    pub width: Option<u32>,
    /// Millimetres; required for [`PageSize::Custom`].
    pub height: Option<u32>,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self::named(PageSize::A4)
    }
}

impl MarkdownOptions {
    /// Options for a named size with the table dimensions filled in.
    pub fn named(page_size: PageSize) -> Self {
        let dims = page_size.dimensions();
        Self {
            page_size,
            width: dims.map(|d| d.width as u32),
            height: dims.map(|d| d.height as u32),
        }
    }

    /// Resolves the physical page size.
    ///
    /// Named sizes ignore `width`/`height`. A custom size without both
    /// dimensions is an input error.
    pub fn page_dimensions(&self) -> Result<PageDimensionsMm, ConvertError> {
        if let Some(dims) = self.page_size.dimensions() {
            return Ok(dims);
        }
        match (self.width, self.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(PageDimensionsMm {
                width: f64::from(width),
                height: f64::from(height),
            }),
            _ => Err(ConvertError::MissingCustomSize),
        }
    }
}

/// Parses the leading integer of a form field the way `parseInt` does:
/// leading whitespace and sign are accepted, trailing garbage is ignored.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Positive integer field; zero, negative and unparsable values count as absent.
pub fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(parse_leading_int)
        .filter(|v| *v > 0)
        .map(|v| v.min(i64::from(u32::MAX)) as u32)
}
