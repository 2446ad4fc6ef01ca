//! Pixel region specification for composite images.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Image region in composite pixels.
///
/// The region is `[top, bottom) x [left, right)`: `top`/`left` inclusive,
/// `bottom`/`right` exclusive. `right == None` means the full composite
/// width.
///
/// Invariants, enforced by [`PixelRect::new`]:
/// - `top >= 0`
/// - `bottom > top`
/// - `left >= 0`
/// - `right > left` when present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub top: i32,
    pub bottom: i32,
    #[serde(default)]
    pub left: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<i32>,
}

impl PixelRect {
    pub fn new(top: i32, bottom: i32, left: i32, right: Option<i32>) -> Result<Self> {
        if top < 0 {
            return Err(ExtractError::InvalidRect(format!("top must be >= 0: {top}")));
        }
        if bottom <= top {
            return Err(ExtractError::InvalidRect(format!(
                "bottom must be > top: {bottom} <= {top}"
            )));
        }
        if left < 0 {
            return Err(ExtractError::InvalidRect(format!("left must be >= 0: {left}")));
        }
        if let Some(r) = right {
            if r <= left {
                return Err(ExtractError::InvalidRect(format!(
                    "right must be > left: {r} <= {left}"
                )));
            }
        }
        Ok(Self { top, bottom, left, right })
    }

    /// Full-width region spanning the given vertical range.
    pub fn spanning(top: i32, bottom: i32) -> Result<Self> {
        Self::new(top, bottom, 0, None)
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Width, or `None` for full-width regions.
    pub fn width(&self) -> Option<i32> {
        self.right.map(|r| r - self.left)
    }

    /// True when `top <= y < bottom`.
    pub fn contains_y(&self, y: i32) -> bool {
        self.top <= y && y < self.bottom
    }

    /// Two regions overlap when they share at least one pixel row.
    /// Adjacent regions (`self.bottom == other.top`) do not overlap.
    pub fn overlaps_vertically(&self, other: &PixelRect) -> bool {
        !(self.bottom <= other.top || other.bottom <= self.top)
    }

    /// The concrete right edge, materializing full-width against the
    /// composite width.
    pub fn right_or(&self, composite_width: i32) -> i32 {
        self.right.unwrap_or(composite_width)
    }
}
