//! Display scale for the paginated stack.
//!
//! The scale is purely presentational: page descriptors are always computed
//! against the unscaled geometry.

use serde::{Deserialize, Serialize};

/// Default upper bound for the responsive scale on wide containers.
pub const DESKTOP_SCALE: f32 = 0.75;
/// Horizontal room kept free around the scaled pages.
pub const HORIZONTAL_MARGIN: f32 = 32.0;
/// Lower bound so a collapsed container never produces a zero or negative scale.
pub const MIN_SCALE: f32 = 0.1;

/// How the view chooses its scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Fit the container width, capped at `max_scale`.
    Responsive { max_scale: f32, horizontal_margin: f32 },
    /// Thumbnail: constant scale, first page only, no chrome.
    Fixed(f32),
}

impl Default for ScaleMode {
    fn default() -> Self {
        ScaleMode::Responsive {
            max_scale: DESKTOP_SCALE,
            horizontal_margin: HORIZONTAL_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleController {
    mode: ScaleMode,
    page_width: f32,
}

impl ScaleController {
    pub fn new(mode: ScaleMode, page_width: f32) -> Self {
        Self { mode, page_width }
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn is_thumbnail(&self) -> bool {
        matches!(self.mode, ScaleMode::Fixed(_))
    }

    /// Scale used before any container width has been observed.
    pub fn initial(&self) -> f32 {
        match self.mode {
            ScaleMode::Responsive { max_scale, .. } => max_scale,
            ScaleMode::Fixed(scale) => scale,
        }
    }

    /// Scale for a container `container_width` px wide.
    pub fn scale_for(&self, container_width: f32) -> f32 {
        match self.mode {
            ScaleMode::Fixed(scale) => scale,
            ScaleMode::Responsive {
                max_scale,
                horizontal_margin,
            } => {
                if !container_width.is_finite() || self.page_width <= 0.0 {
                    return max_scale;
                }
                let fit = (container_width - horizontal_margin) / self.page_width;
                fit.min(max_scale).max(MIN_SCALE.min(max_scale))
            }
        }
    }
}
