//! Font loading and text measurement using `ttf-parser`.
//!
//! Content renderers measure text through [`FontManager`] so that line
//! wrapping agrees with what the rasterizer later draws. Without a real font
//! the manager falls back to Helvetica-like synthetic metrics.

use std::collections::HashMap;
use std::path::Path;

/// Regular / bold / italic variant of the single text family.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub struct FontVariant {
    pub bold: bool,
    pub italic: bool,
}

impl FontVariant {
    pub const REGULAR: Self = Self {
        bold: false,
        italic: false,
    };

    pub fn new(bold: bool, italic: bool) -> Self {
        Self { bold, italic }
    }
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes; empty for synthetic metrics.
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn synthetic() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Candidate system fonts, tried in order by [`FontManager::with_system_fonts`].
const SYSTEM_FONTS: &[(&str, FontVariant)] = &[
    (
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        FontVariant::REGULAR,
    ),
    (
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        FontVariant {
            bold: true,
            italic: false,
        },
    ),
    (
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        FontVariant::REGULAR,
    ),
    (
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
        FontVariant {
            bold: true,
            italic: false,
        },
    ),
    ("/Library/Fonts/Arial.ttf", FontVariant::REGULAR),
    ("C:\\Windows\\Fonts\\arial.ttf", FontVariant::REGULAR),
    (
        "C:\\Windows\\Fonts\\arialbd.ttf",
        FontVariant {
            bold: true,
            italic: false,
        },
    ),
];

/// Manages loaded fonts.
pub struct FontManager {
    fonts: HashMap<FontVariant, FontData>,
    fallback: FontData,
}

impl FontManager {
    /// A manager with synthetic metrics only.
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            fallback: FontData::synthetic(),
        }
    }

    /// A manager preloaded with the first usable system sans-serif faces.
    pub fn with_system_fonts() -> Self {
        let mut mgr = Self::new();
        for (path, variant) in SYSTEM_FONTS {
            if mgr.fonts.contains_key(variant) {
                continue;
            }
            let path = Path::new(path);
            if !path.exists() {
                continue;
            }
            match mgr.load_font_file(path, *variant) {
                Ok(()) => log::debug!("loaded system font {}", path.display()),
                Err(e) => log::warn!("ignoring system font {}: {e}", path.display()),
            }
        }
        if !mgr.has_real_fonts() {
            log::warn!("no system font found, text will be drawn as placeholder bars");
        }
        mgr
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(&mut self, variant: FontVariant, bytes: Vec<u8>) -> Result<(), String> {
        let face =
            ttf_parser::Face::parse(&bytes, 0).map_err(|e| format!("Failed to parse font: {e}"))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };
        self.fonts.insert(variant, data);
        Ok(())
    }

    /// Load a TTF/OTF font from disk.
    pub fn load_font_file(&mut self, path: &Path, variant: FontVariant) -> Result<(), String> {
        let bytes =
            std::fs::read(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        self.load_font(variant, bytes)
    }

    /// Font data for a variant, falling back to regular, then to synthetic metrics.
    pub fn get(&self, variant: FontVariant) -> &FontData {
        self.fonts
            .get(&variant)
            .or_else(|| self.fonts.get(&FontVariant::new(variant.bold, false)))
            .or_else(|| self.fonts.get(&FontVariant::REGULAR))
            .unwrap_or(&self.fallback)
    }

    /// Whether a real regular face is loaded.
    pub fn has_real_fonts(&self) -> bool {
        self.fonts.contains_key(&FontVariant::REGULAR)
    }

    /// Measure the width of a string at a given font size (in px).
    /// With real font bytes the glyph advances are summed; otherwise an
    /// average character width heuristic (0.5 × font_size per char) is used.
    pub fn measure_text_width(&self, text: &str, font_size: f32, variant: FontVariant) -> f32 {
        let data = self.get(variant);
        let heuristic = || {
            let avg = if variant.bold { 0.55 } else { 0.5 };
            text.chars().count() as f32 * font_size * avg
        };

        if data.is_synthetic() {
            return heuristic();
        }

        match ttf_parser::Face::parse(&data.bytes, 0) {
            Ok(face) => {
                let scale = font_size / data.units_per_em;
                text.chars()
                    .map(|ch| match face.glyph_index(ch) {
                        Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                        None => font_size * 0.5,
                    })
                    .sum()
            }
            Err(_) => heuristic(),
        }
    }

    /// Distance from the top of a line box to the baseline, in px.
    pub fn ascender_px(&self, font_size: f32, variant: FontVariant) -> f32 {
        let data = self.get(variant);
        data.ascender * font_size / data.units_per_em
    }

    /// Line height in px.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    variant: FontVariant,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            let w = fonts.measure_text_width(&candidate, font_size, variant);
            if w > max_width && !current_line.is_empty() {
                lines.push(std::mem::replace(&mut current_line, word.to_string()));
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
