//! Page-count estimates for Markdown content.
//!
//! Two independent heuristics live here. [`estimate_from_source`] runs on the
//! raw Markdown before any layout exists. [`estimate_from_layout`] runs once
//! the content has been laid out at the target page width and its height is
//! known. Both are previews only; the renderer's own pagination is the
//! authoritative count and may differ.

use crate::options::PageDimensionsMm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CSS reference resolution: 96 pixels per inch.
pub const PX_PER_MM: f64 = 96.0 / 25.4;

/// Margin applied on every side of a rendered page, in pixels.
pub const PAGE_MARGIN_PX: f64 = 40.0;

/// Pre-render increments, in pixels.
const HEADING_LINE_PX: f64 = 30.0;
const BLANK_LINE_PX: f64 = 16.0;
/// 13px text at line-height 1.5.
const TEXT_LINE_PX: f64 = 19.5;
const CHARS_PER_LINE: usize = 80;

/// A4 height at 96dpi minus both margins. The pre-render heuristic always
/// assumes A4 regardless of the selected page size.
const ASSUMED_PAGE_CONTENT_PX: f64 = 1123.0 - 2.0 * PAGE_MARGIN_PX;

/// Converts millimetres to CSS pixels.
pub fn mm_to_px(mm: f64) -> f64 {
    mm * PX_PER_MM
}

/// Number of printed pages, never less than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageEstimate(u32);

impl PageEstimate {
    pub const ONE: PageEstimate = PageEstimate(1);

    pub fn new(pages: u32) -> Self {
        Self(pages.max(1))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    fn from_ratio(height: f64, per_page: f64) -> Self {
        if !height.is_finite() || !per_page.is_finite() || height <= 0.0 || per_page <= 0.0 {
            return Self::ONE;
        }
        let pages = (height / per_page).ceil();
        Self::new(pages.min(f64::from(u32::MAX)) as u32)
    }
}

impl Default for PageEstimate {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for PageEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which heuristic produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    PreRender,
    PostRender,
}

/// Line-counting estimate over raw Markdown.
///
/// Headings and blank lines add fixed heights; other lines wrap every 80
/// characters at a fixed line height.
pub fn estimate_from_source(markdown: &str) -> PageEstimate {
    let height: f64 = markdown
        .split('\n')
        .map(|line| {
            if line.starts_with('#') {
                HEADING_LINE_PX
            } else if line.trim().is_empty() {
                BLANK_LINE_PX
            } else {
                let wrapped = line.chars().count().div_ceil(CHARS_PER_LINE);
                wrapped as f64 * TEXT_LINE_PX
            }
        })
        .sum();

    PageEstimate::from_ratio(height, ASSUMED_PAGE_CONTENT_PX)
}

/// Measurement-based estimate.
///
/// `content_height_px` is the laid-out content height excluding the page
/// margins, measured at the full page width.
pub fn estimate_from_layout(content_height_px: f64, page: PageDimensionsMm) -> PageEstimate {
    PageEstimate::from_ratio(content_height_px, available_height_px(page))
}

/// Printable height of one page in pixels.
pub fn available_height_px(page: PageDimensionsMm) -> f64 {
    mm_to_px(page.height) - 2.0 * PAGE_MARGIN_PX
}

/// Printable width of one page in pixels.
pub fn available_width_px(page: PageDimensionsMm) -> f64 {
    mm_to_px(page.width) - 2.0 * PAGE_MARGIN_PX
}
