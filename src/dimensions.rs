//! Natural pixel size recovery from SVG source text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Opening `<svg ...>` tag of the document.
static RE_SVG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<svg(?:\s[^>]*)?>").unwrap());

static RE_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)width\s*=\s*["']([^"']*)["']"#).unwrap());

static RE_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)height\s*=\s*["']([^"']*)["']"#).unwrap());

static RE_VIEW_BOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(?:^|\s)viewBox\s*=\s*["']([^"']*)["']"#).unwrap());

/// Bare number or number with a `px` suffix. Percentages and relative units
/// do not match.
static RE_PIXEL_LENGTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.?\d*)(?:px)?$").unwrap());

/// Width and height in pixels, both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    /// Returns `None` unless both sides are finite and greater than zero.
    pub fn new(width: f64, height: f64) -> Option<Self> {
        if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
            Some(Self { width, height })
        } else {
            None
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Sizes rounded to whole pixels, at least 1 each.
    pub fn rounded(&self) -> (u32, u32) {
        (
            (self.width.round() as u32).max(1),
            (self.height.round() as u32).max(1),
        )
    }
}

/// Byte range of the root `<svg ...>` tag, if the text contains one.
pub fn root_svg_tag(svg: &str) -> Option<Range<usize>> {
    RE_SVG_TAG.find(svg).map(|m| m.range())
}

/// Recovers the natural size of an SVG document.
///
/// Explicit `width`/`height` on the root element win when both are plain
/// pixel lengths. Otherwise the third and fourth `viewBox` numbers are used.
/// Returns `None` when neither source yields two positive numbers; callers
/// keep whatever dimensions they already had.
pub fn extract_svg_dimensions(svg: &str) -> Option<Dimensions> {
    let tag = RE_SVG_TAG.find(svg)?.as_str();
    // Skip the element name so attribute patterns only see attributes.
    let attrs = &tag[4..];

    from_size_attributes(attrs).or_else(|| from_view_box(attrs))
}

fn from_size_attributes(attrs: &str) -> Option<Dimensions> {
    let width = attribute(&RE_WIDTH, attrs).and_then(parse_pixel_length)?;
    let height = attribute(&RE_HEIGHT, attrs).and_then(parse_pixel_length)?;
    Dimensions::new(width, height)
}

fn from_view_box(attrs: &str) -> Option<Dimensions> {
    let raw = attribute(&RE_VIEW_BOX, attrs)?;
    let values: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;

    match values.as_slice() {
        [_, _, width, height] => Dimensions::new(*width, *height),
        _ => None,
    }
}

fn attribute<'a>(pattern: &Regex, attrs: &'a str) -> Option<&'a str> {
    pattern
        .captures(attrs)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn parse_pixel_length(value: &str) -> Option<f64> {
    let caps = RE_PIXEL_LENGTH.captures(value)?;
    caps.get(1)?.as_str().parse().ok()
}
