//! Page geometry – the fixed dimensions and padding rules of one page.
//!
//! All layout happens in CSS pixels at 96 DPI. A4 is 794 × 1123 px, which
//! maps to 210 × 297 mm through [`MM_PER_PX`].

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// A4 width in px at 96 DPI.
pub const A4_WIDTH_PX: f32 = 794.0;
/// A4 height in px at 96 DPI.
pub const A4_HEIGHT_PX: f32 = 1123.0;
/// A4 width in millimetres.
pub const A4_WIDTH_MM: f32 = 210.0;
/// A4 height in millimetres.
pub const A4_HEIGHT_MM: f32 = 297.0;

/// Millimetres per CSS pixel (25.4 mm per inch / 96 px per inch).
pub const MM_PER_PX: f32 = 25.4 / 96.0;
/// Millimetres per PDF point (1 pt = 1/72 inch).
pub const MM_PER_PT: f32 = 25.4 / 72.0;

/// Geometry used by the pagination engine and the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct PageGeometry {
    /// Page width in px.
    pub page_width: f32,
    /// Page height in px.
    pub page_height: f32,
    /// Blank band above the content on continuation pages.
    pub top_padding: f32,
    /// Blank band below the content on every page (room for the footer).
    pub bottom_padding: f32,
    /// A section heading closer than this to a page bottom moves to the next page.
    pub orphan_threshold: f32,
    /// Shortest slice the orphan rule may leave on a page.
    pub min_slice_height: f32,
}

impl PageGeometry {
    /// A4 portrait with the default paddings and orphan rule.
    pub const fn a4() -> Self {
        Self {
            page_width: A4_WIDTH_PX,
            page_height: A4_HEIGHT_PX,
            top_padding: 40.0,
            bottom_padding: 32.0,
            orphan_threshold: 80.0,
            min_slice_height: 100.0,
        }
    }

    /// Usable content height of page `index`. The first page has no top padding.
    pub fn max_visible(&self, index: usize) -> f32 {
        if index == 0 {
            self.page_height - self.bottom_padding
        } else {
            self.page_height - self.top_padding - self.bottom_padding
        }
    }

    /// Where the content viewport starts inside page frame `index`.
    pub fn viewport_top(&self, index: usize) -> f32 {
        if index == 0 {
            0.0
        } else {
            self.top_padding
        }
    }

    /// Check the geometry invariants.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let dims = [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
        ];
        for (name, value) in dims {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidGeometry(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let paddings = [
            ("top_padding", self.top_padding),
            ("bottom_padding", self.bottom_padding),
            ("orphan_threshold", self.orphan_threshold),
            ("min_slice_height", self.min_slice_height),
        ];
        for (name, value) in paddings {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::InvalidGeometry(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if self.page_height <= self.top_padding + self.bottom_padding {
            return Err(LayoutError::InvalidGeometry(format!(
                "page_height {} must exceed top_padding + bottom_padding ({})",
                self.page_height,
                self.top_padding + self.bottom_padding
            )));
        }
        Ok(())
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

/// Physical size of one output page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPage {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PhysicalPage {
    pub const fn a4() -> Self {
        Self {
            width_mm: A4_WIDTH_MM,
            height_mm: A4_HEIGHT_MM,
        }
    }

    /// Physical size matching a pixel geometry through the fixed px→mm ratio.
    pub fn from_geometry(geometry: &PageGeometry) -> Self {
        Self {
            width_mm: geometry.page_width * MM_PER_PX,
            height_mm: geometry.page_height * MM_PER_PX,
        }
    }

    pub fn width_pt(&self) -> f32 {
        self.width_mm / MM_PER_PT
    }

    pub fn height_pt(&self) -> f32 {
        self.height_mm / MM_PER_PT
    }
}

impl Default for PhysicalPage {
    fn default() -> Self {
        Self::a4()
    }
}
