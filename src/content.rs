//! Content block – the single continuous rendering of a document, before
//! pagination. This is the contract between a content renderer and the
//! pagination engine: positioned items in unscaled px plus the section
//! markers the renderer emitted for its headings.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::geometry::A4_WIDTH_PX;

/// RGBA colour (0.0 – 1.0). Serialised as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Self = Self::opaque(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::opaque(1.0, 1.0, 1.0);

    pub const fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            3 => Some(Self::opaque(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            6 | 8 => {
                let a = if hex.len() == 8 { channel(&hex[6..8])? } else { 1.0 };
                Some(Self {
                    r: channel(&hex[0..2])?,
                    g: channel(&hex[2..4])?,
                    b: channel(&hex[4..6])?,
                    a,
                })
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut out = format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b));
        if self.a < 1.0 {
            out.push_str(&format!("{:02x}", byte(self.a)));
        }
        out
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::from_hex(&value).ok_or_else(|| format!("invalid colour {value:?}"))
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_hex()
    }
}

/// The top edge of a heading that must not be stranded at a page bottom,
/// relative to the content block's origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionMarker {
    pub vertical_offset: f32,
}

impl SectionMarker {
    pub fn at(vertical_offset: f32) -> Self {
        Self { vertical_offset }
    }
}

/// One line of text. `y` is the top of the line box; the baseline sits one
/// ascender below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub font_size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default = "TextRun::default_color")]
    pub color: Rgba,
}

impl TextRun {
    fn default_color() -> Rgba {
        Rgba::BLACK
    }
}

/// A positioned drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentItem {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgba,
    },
    Text(TextRun),
    /// `src` is a base64 data URI or a file path.
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        src: String,
    },
}

impl ContentItem {
    /// Vertical extent `(top, bottom)` of the item.
    pub fn vertical_extent(&self) -> (f32, f32) {
        match self {
            ContentItem::Rect { y, height, .. } | ContentItem::Image { y, height, .. } => {
                (*y, y + height)
            }
            // Line box height approximated as 1.25 × font size.
            ContentItem::Text(run) => (run.y, run.y + run.font_size * 1.25),
        }
    }
}

/// The full, unpaginated rendering of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Width of the block in px (normally the page width).
    #[serde(default = "ContentBlock::default_width")]
    pub width: f32,
    /// Explicit measured height; when absent the height is the lowest item bottom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    /// Items in paint order.
    #[serde(default)]
    pub items: Vec<ContentItem>,
    /// Section headings, in any order.
    #[serde(default)]
    pub markers: Vec<SectionMarker>,
}

impl ContentBlock {
    pub fn new(width: f32) -> Self {
        Self {
            width,
            height: None,
            items: Vec::new(),
            markers: Vec::new(),
        }
    }

    fn default_width() -> f32 {
        A4_WIDTH_PX
    }

    pub fn push(&mut self, item: ContentItem) {
        self.items.push(item);
    }

    pub fn mark_section(&mut self, vertical_offset: f32) {
        self.markers.push(SectionMarker::at(vertical_offset));
    }

    /// The scroll height of the block: the explicit height if set, otherwise
    /// the lowest bottom edge of any item.
    pub fn measured_height(&self) -> f32 {
        if let Some(h) = self.height {
            return h.max(0.0);
        }
        self.items
            .iter()
            .map(|item| item.vertical_extent().1)
            .fold(0.0f32, f32::max)
    }

    /// All distinct image sources, in first-use order.
    pub fn image_sources(&self) -> Vec<&str> {
        let mut srcs: Vec<&str> = Vec::new();
        for item in &self.items {
            if let ContentItem::Image { src, .. } = item {
                if !srcs.contains(&src.as_str()) {
                    srcs.push(src.as_str());
                }
            }
        }
        srcs
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(json)?)
    }
}
