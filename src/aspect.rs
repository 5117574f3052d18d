//! Width/height reconciliation for the raster output size.
//!
//! All transitions take the current [`AspectState`] by value and return the
//! next one; nothing is mutated behind the caller's back.

use crate::dimensions::Dimensions;
use serde::{Deserialize, Serialize};

/// Default output size and ratio before any file has been inspected.
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_RATIO: f64 = 16.0 / 9.0;

/// Requested output size plus the "maintain aspect ratio" lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectState {
    pub width: u32,
    pub height: u32,
    pub locked: bool,
    /// Stored `width / height`. Only meaningful while `locked`.
    pub ratio: f64,
}

/// A user edit to the size controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeEdit {
    /// Raw width as typed; zero or negative is invalid input.
    Width(i64),
    /// Raw height as typed; zero or negative is invalid input.
    Height(i64),
    ToggleLock,
    /// New natural size from a freshly selected file.
    Reseed(Dimensions),
}

impl Default for AspectState {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            locked: true,
            ratio: DEFAULT_RATIO,
        }
    }
}

impl AspectState {
    pub fn apply(self, edit: SizeEdit) -> Self {
        match edit {
            SizeEdit::Width(raw) => self.with_width(raw),
            SizeEdit::Height(raw) => self.with_height(raw),
            SizeEdit::ToggleLock => self.toggle_lock(),
            SizeEdit::Reseed(dims) => {
                let (width, height) = dims.rounded();
                Self {
                    width,
                    height,
                    ratio: dims.aspect_ratio(),
                    ..self
                }
            }
        }
    }

    /// Both sides are usable as conversion input.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn with_width(self, raw: i64) -> Self {
        let width = clamp_input(raw);
        let height = if self.locked && width > 0 {
            round_side(f64::from(width) / self.ratio)
        } else {
            self.height
        };
        Self { width, height, ..self }
    }

    fn with_height(self, raw: i64) -> Self {
        let height = clamp_input(raw);
        let width = if self.locked && height > 0 {
            round_side(f64::from(height) * self.ratio)
        } else {
            self.width
        };
        Self { width, height, ..self }
    }

    fn toggle_lock(self) -> Self {
        if self.locked {
            return Self { locked: false, ..self };
        }
        let ratio = if self.is_valid() {
            f64::from(self.width) / f64::from(self.height)
        } else {
            self.ratio
        };
        Self {
            locked: true,
            ratio,
            ..self
        }
    }
}

fn clamp_input(raw: i64) -> u32 {
    raw.clamp(0, i64::from(u32::MAX)) as u32
}

fn round_side(value: f64) -> u32 {
    if value.is_finite() {
        (value.round().max(1.0)).min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}
