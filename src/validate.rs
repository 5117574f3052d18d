//! Upload validation: per-category size limits and a MIME/extension allow-list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Default byte limit for SVG uploads.
pub const MAX_SVG_BYTES: u64 = 10 * MIB;

/// Default byte limit for Markdown uploads.
pub const MAX_MARKDOWN_BYTES: u64 = 5 * MIB;

/// Generic binary type sent for files without a known type.
pub const UNTYPED_MIME: &str = "application/octet-stream";

const SVG_TYPES: &[(&str, &[&str])] = &[("image/svg+xml", &[".svg"])];

const MARKDOWN_TYPES: &[(&str, &[&str])] = &[
    ("text/markdown", &[".md", ".markdown"]),
    ("text/plain", &[".md", ".markdown"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File is too large. The maximum size is {}.", human_limit(.limit_bytes))]
    TooLarge { limit_bytes: u64 },

    #[error("Unsupported file type")]
    UnsupportedType { name: String },
}

/// Which converter a file is headed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Svg,
    Markdown,
}

impl FileCategory {
    /// Accepted MIME types, each with the extensions allowed alongside it.
    pub fn accepted_types(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            FileCategory::Svg => SVG_TYPES,
            FileCategory::Markdown => MARKDOWN_TYPES,
        }
    }
}

/// Byte limits per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    pub svg_bytes: u64,
    pub markdown_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            svg_bytes: MAX_SVG_BYTES,
            markdown_bytes: MAX_MARKDOWN_BYTES,
        }
    }
}

impl UploadLimits {
    pub fn for_category(&self, category: FileCategory) -> u64 {
        match category {
            FileCategory::Svg => self.svg_bytes,
            FileCategory::Markdown => self.markdown_bytes,
        }
    }

    pub fn largest(&self) -> u64 {
        self.svg_bytes.max(self.markdown_bytes)
    }
}

/// Checks size first, then the MIME/extension pairing.
///
/// An empty MIME type is accepted as long as the extension is allowed for
/// some type of the category; browsers report no type for unknown extensions.
/// `application/octet-stream` is treated the same way, since multipart
/// encoders fall back to it when a file has no type.
///
/// # Arguments
///
/// * `category` - Which converter the file is headed for
/// * `name` - Original file name; its last extension is checked
/// * `mime` - Reported MIME type, parameters ignored
/// * `size` - File size in bytes
/// * `limits` - Per-category byte limits
///
/// # Errors
///
/// Returns [`UploadError::TooLarge`] when `size` exceeds the category limit,
/// otherwise [`UploadError::UnsupportedType`] when no allowed pairing matches.
pub fn validate_upload(
    category: FileCategory,
    name: &str,
    mime: &str,
    size: u64,
    limits: &UploadLimits,
) -> Result<(), UploadError> {
    let limit = limits.for_category(category);
    if size > limit {
        return Err(UploadError::TooLarge { limit_bytes: limit });
    }

    let unsupported = || UploadError::UnsupportedType {
        name: name.to_string(),
    };
    let extension = extension_of(name).ok_or_else(unsupported)?;
    let mime = mime.split(';').next().unwrap_or_default().trim();
    let untyped = mime.is_empty() || mime.eq_ignore_ascii_case(UNTYPED_MIME);

    let accepted = category
        .accepted_types()
        .iter()
        .any(|(accepted_mime, extensions)| {
            (untyped || mime.eq_ignore_ascii_case(accepted_mime))
                && extensions.contains(&extension.as_str())
        });

    if accepted {
        Ok(())
    } else {
        Err(unsupported())
    }
}

/// Lower-cased extension including the dot; `None` when the name has no dot.
fn extension_of(name: &str) -> Option<String> {
    let (_, last) = name.rsplit_once('.')?;
    Some(format!(".{}", last.to_lowercase()))
}

/// Human-readable byte limit: whole megabytes (rounded), or kilobytes below
/// one megabyte.
fn human_limit(bytes: &u64) -> String {
    if *bytes >= MIB {
        format!("{}MB", (bytes + MIB / 2) / MIB)
    } else {
        format!("{}KB", ((bytes + 512) / 1024).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_exactly_at_limit_is_accepted() {
        let limits = UploadLimits::default();
        let result = validate_upload(
            FileCategory::Svg,
            "logo.svg",
            "image/svg+xml",
            MAX_SVG_BYTES,
            &limits,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_one_byte_over_is_rejected_with_limit_in_mb() {
        let limits = UploadLimits::default();
        let err = validate_upload(
            FileCategory::Markdown,
            "notes.md",
            "text/markdown",
            MAX_MARKDOWN_BYTES + 1,
            &limits,
        )
        .unwrap_err();
        assert_eq!(
            err,
            UploadError::TooLarge {
                limit_bytes: MAX_MARKDOWN_BYTES
            }
        );
        assert!(err.to_string().contains("5MB"));
    }

    #[test]
    fn test_markdown_accepts_plain_text_mime() {
        let limits = UploadLimits::default();
        assert!(validate_upload(FileCategory::Markdown, "README.markdown", "text/plain", 10, &limits).is_ok());
        assert!(validate_upload(FileCategory::Markdown, "README.MD", "", 10, &limits).is_ok());
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        let limits = UploadLimits::default();
        let result = validate_upload(
            FileCategory::Markdown,
            "a.md",
            "text/markdown; charset=utf-8",
            1,
            &limits,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_mismatched_pairs_are_rejected() {
        let limits = UploadLimits::default();
        let cases = [
            (FileCategory::Svg, "logo.png", "image/svg+xml"),
            (FileCategory::Svg, "logo.svg", "image/png"),
            (FileCategory::Markdown, "notes.txt", "text/plain"),
            (FileCategory::Markdown, "svg.md", "image/svg+xml"),
            (FileCategory::Svg, "svg", ""),
        ];
        for (category, name, mime) in cases {
            let err = validate_upload(category, name, mime, 1, &limits).unwrap_err();
            assert_eq!(err.to_string(), "Unsupported file type", "{name} {mime}");
        }
    }

    #[test]
    fn test_name_without_extension_is_rejected() {
        let limits = UploadLimits::default();
        for name in ["svg", "md", ""] {
            let category = if name == "md" {
                FileCategory::Markdown
            } else {
                FileCategory::Svg
            };
            let err = validate_upload(category, name, "", 1, &limits).unwrap_err();
            assert!(matches!(err, UploadError::UnsupportedType { .. }), "{name:?}");
        }
    }

    #[test]
    fn test_octet_stream_counts_as_untyped() {
        let limits = UploadLimits::default();
        assert!(validate_upload(FileCategory::Markdown, "notes.md", UNTYPED_MIME, 1, &limits).is_ok());
        assert!(validate_upload(FileCategory::Svg, "logo.svg", UNTYPED_MIME, 1, &limits).is_ok());
        assert!(validate_upload(FileCategory::Svg, "logo.png", UNTYPED_MIME, 1, &limits).is_err());
    }

    #[test]
    fn test_small_limits_are_shown_in_kilobytes() {
        let err = UploadError::TooLarge { limit_bytes: 512 * 1024 };
        assert_eq!(err.to_string(), "File is too large. The maximum size is 512KB.");
        let err = UploadError::TooLarge { limit_bytes: 100 };
        assert!(err.to_string().ends_with("1KB."));
        let err = UploadError::TooLarge { limit_bytes: 3 * MIB / 2 };
        assert!(err.to_string().ends_with("2MB."));
    }

    #[test]
    fn test_size_checked_before_type() {
        let limits = UploadLimits {
            svg_bytes: 4,
            markdown_bytes: 4,
        };
        let err = validate_upload(FileCategory::Svg, "bad.exe", "", 5, &limits).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { limit_bytes: 4 }));
    }
}
