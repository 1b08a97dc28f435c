//! Page rasterization – turns a composited [`PageFrame`] into a bitmap.
//!
//! [`SkiaRasterizer`] paints with `tiny-skia`: white page, sidebar band,
//! the content slice clipped to the frame's viewport, then chrome (footer
//! and shadow edge) unless the capture asks for it to be left out.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::RgbaImage;
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::compositor::{PageFrame, Sidebar};
use crate::content::{ContentBlock, ContentItem, Rgba, TextRun};
use crate::error::{ExportError, RasterError};
use crate::fonts::{FontManager, FontVariant};

/// Footer text size in px.
const FOOTER_FONT_SIZE: f32 = 12.0;
/// Gap between the footer and the page bottom in px.
const FOOTER_BOTTOM: f32 = 8.0;

/// Per-capture settings shared by every frame of one export.
pub struct CaptureContext<'a> {
    /// Device pixels per layout pixel.
    pub pixel_ratio: f32,
    /// Paint footers and shadows.
    pub include_chrome: bool,
    pub background: Rgba,
    pub images: &'a ImageStore,
}

/// Converts page frames into bitmaps.
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        frame: &PageFrame<'_>,
        ctx: &CaptureContext<'_>,
    ) -> Result<RgbaImage, RasterError>;
}

/// Decoded images keyed by their `src`.
#[derive(Default)]
pub struct ImageStore {
    images: HashMap<String, Pixmap>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every image the content references. The first image that
    /// fails to load aborts the whole load.
    pub fn load(content: &ContentBlock) -> Result<Self, ExportError> {
        let mut store = Self::new();
        for src in content.image_sources() {
            let pixmap = load_image(src).map_err(|reason| ExportError::ImageLoad {
                src: preview(src),
                reason,
            })?;
            log::debug!(
                "loaded image {} ({}x{})",
                preview(src),
                pixmap.width(),
                pixmap.height()
            );
            store.images.insert(src.to_string(), pixmap);
        }
        Ok(store)
    }

    pub fn get(&self, src: &str) -> Option<&Pixmap> {
        self.images.get(src)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

fn preview(src: &str) -> String {
    if src.len() > 64 {
        let cut = (0..=64).rev().find(|i| src.is_char_boundary(*i)).unwrap_or(0);
        format!("{}…", &src[..cut])
    } else {
        src.to_string()
    }
}

fn load_image(src: &str) -> Result<Pixmap, String> {
    let bytes = if src.starts_with("data:") {
        parse_data_uri(src)?
    } else {
        std::fs::read(src).map_err(|e| format!("read error: {e}"))?
    };
    let rgba = image::load_from_memory(&bytes)
        .map_err(|e| format!("decode error: {e}"))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| format!("invalid image size {width}x{height}"))?;
    for (src_px, dst_px) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src_px[3];
        dst_px[0] = premultiply(src_px[0], a);
        dst_px[1] = premultiply(src_px[1], a);
        dst_px[2] = premultiply(src_px[2], a);
        dst_px[3] = a;
    }
    Ok(pixmap)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let prod = channel as u16 * alpha as u16 + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = &src["data:".len()..];
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "Invalid data URI: missing `,` separator".to_string())?;
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("Base64 decode error: {e}"))
}

/// The default rasterizer.
pub struct SkiaRasterizer {
    fonts: Arc<FontManager>,
}

impl SkiaRasterizer {
    pub fn new(fonts: Arc<FontManager>) -> Self {
        Self { fonts }
    }

    fn draw_item(
        &self,
        pixmap: &mut Pixmap,
        item: &ContentItem,
        ts: Transform,
        mask: Option<&Mask>,
        images: &ImageStore,
    ) -> Result<(), RasterError> {
        match item {
            ContentItem::Rect {
                x,
                y,
                width,
                height,
                color,
            } => {
                if let Some(rect) = Rect::from_xywh(*x, *y, *width, *height) {
                    pixmap.fill_rect(rect, &fill_paint(*color), ts, mask);
                }
            }
            ContentItem::Text(run) => self.draw_text(pixmap, run, ts, mask),
            ContentItem::Image {
                x,
                y,
                width,
                height,
                src,
            } => {
                let image = images
                    .get(src)
                    .ok_or_else(|| RasterError(format!("image {} was not loaded", preview(src))))?;
                if image.width() == 0 || image.height() == 0 {
                    return Ok(());
                }
                let sx = width / image.width() as f32;
                let sy = height / image.height() as f32;
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                pixmap.draw_pixmap(
                    0,
                    0,
                    image.as_ref(),
                    &paint,
                    ts.pre_translate(*x, *y).pre_scale(sx, sy),
                    mask,
                );
            }
        }
        Ok(())
    }

    fn draw_text(&self, pixmap: &mut Pixmap, run: &TextRun, ts: Transform, mask: Option<&Mask>) {
        if run.text.trim().is_empty() || run.font_size <= 0.0 {
            return;
        }
        let variant = FontVariant::new(run.bold, run.italic);
        let data = self.fonts.get(variant);
        let paint = fill_paint(run.color);

        if data.is_synthetic() {
            // Greeked text: a bar spanning the measured run.
            let width = self.fonts.measure_text_width(&run.text, run.font_size, variant);
            let bar = Rect::from_xywh(run.x, run.y + run.font_size * 0.3, width, run.font_size * 0.5);
            if let Some(rect) = bar {
                let faded = fill_paint(run.color.with_alpha(run.color.a * 0.35));
                pixmap.fill_rect(rect, &faded, ts, mask);
            }
            return;
        }

        let (Some(hb_face), Ok(face)) = (
            rustybuzz::Face::from_slice(&data.bytes, 0),
            ttf_parser::Face::parse(&data.bytes, 0),
        ) else {
            log::warn!("font face could not be parsed, skipping text run");
            return;
        };

        let scale = run.font_size / data.units_per_em;
        let baseline = run.y + self.fonts.ascender_px(run.font_size, variant);

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(&run.text);
        let shaped = rustybuzz::shape(&hb_face, &[], buffer);

        let mut pen_x = run.x;
        for (info, pos) in shaped.glyph_infos().iter().zip(shaped.glyph_positions()) {
            let origin_x = pen_x + pos.x_offset as f32 * scale;
            let origin_y = baseline - pos.y_offset as f32 * scale;
            let mut builder = GlyphPathBuilder::new(origin_x, origin_y, scale);
            if face
                .outline_glyph(GlyphId(info.glyph_id as u16), &mut builder)
                .is_some()
            {
                if let Some(path) = builder.finish() {
                    pixmap.fill_path(&path, &paint, FillRule::Winding, ts, mask);
                }
            }
            pen_x += pos.x_advance as f32 * scale;
        }
    }

    fn draw_chrome(&self, pixmap: &mut Pixmap, frame: &PageFrame<'_>, base: Transform) {
        if frame.chrome.shadow {
            let edge = Rect::from_xywh(0.5, 0.5, frame.width - 1.0, frame.height - 1.0)
                .map(PathBuilder::from_rect);
            if let Some(path) = edge {
                let stroke = Stroke {
                    width: 1.0,
                    ..Stroke::default()
                };
                let paint = fill_paint(Rgba::BLACK.with_alpha(0.25));
                pixmap.stroke_path(&path, &paint, &stroke, base, None);
            }
        }
        if let Some(label) = &frame.footer {
            let width = self
                .fonts
                .measure_text_width(label, FOOTER_FONT_SIZE, FontVariant::REGULAR);
            let run = TextRun {
                x: (frame.width - width) / 2.0,
                y: frame.height - FOOTER_BOTTOM - FOOTER_FONT_SIZE * 1.25,
                text: label.clone(),
                font_size: FOOTER_FONT_SIZE,
                bold: false,
                italic: false,
                color: Rgba::opaque(0.631, 0.631, 0.667),
            };
            self.draw_text(pixmap, &run, base, None);
        }
    }
}

impl Rasterizer for SkiaRasterizer {
    fn rasterize(
        &self,
        frame: &PageFrame<'_>,
        ctx: &CaptureContext<'_>,
    ) -> Result<RgbaImage, RasterError> {
        let ratio = ctx.pixel_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(RasterError(format!("invalid pixel ratio {ratio}")));
        }
        let width_px = (frame.width * ratio).round() as u32;
        let height_px = (frame.height * ratio).round() as u32;
        let mut pixmap = Pixmap::new(width_px, height_px)
            .ok_or_else(|| RasterError(format!("invalid raster size {width_px}x{height_px}")))?;
        pixmap.fill(to_sk_color(ctx.background));

        let base = Transform::from_scale(ratio, ratio);

        if let (Some((x, width)), Sidebar::Band { color, .. }) =
            (frame.sidebar.span(frame.width), frame.sidebar)
        {
            if let Some(rect) = Rect::from_xywh(x, 0.0, width, frame.height) {
                pixmap.fill_rect(rect, &fill_paint(color), base, None);
            }
        }

        let viewport = frame.viewport;
        if viewport.height > 0.0 {
            let clip = Rect::from_xywh(0.0, viewport.top, frame.width, viewport.height)
                .map(PathBuilder::from_rect)
                .ok_or_else(|| RasterError("invalid viewport".to_string()))?;
            let mask = viewport_mask(&clip, width_px, height_px, base)?;
            let content_ts = base.pre_translate(0.0, frame.content_translation());
            let slice_top = frame.content_offset;
            let slice_bottom = frame.content_offset + viewport.height;

            for item in &frame.content.items {
                let (top, bottom) = item.vertical_extent();
                if bottom <= slice_top || top >= slice_bottom {
                    continue;
                }
                self.draw_item(&mut pixmap, item, content_ts, Some(&mask), ctx.images)?;
            }
        }

        if ctx.include_chrome {
            self.draw_chrome(&mut pixmap, frame, base);
        }

        let mut rgba = Vec::with_capacity(width_px as usize * height_px as usize * 4);
        for px in pixmap.pixels() {
            let c = px.demultiply();
            rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(width_px, height_px, rgba)
            .ok_or_else(|| RasterError("pixel buffer size mismatch".to_string()))
    }
}

fn viewport_mask(
    clip: &Path,
    width: u32,
    height: u32,
    transform: Transform,
) -> Result<Mask, RasterError> {
    let mut mask = Mask::new(width, height)
        .ok_or_else(|| RasterError(format!("invalid mask size {width}x{height}")))?;
    mask.fill_path(clip, FillRule::Winding, false, transform);
    Ok(mask)
}

fn fill_paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Rgba) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        color.a.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

/// Maps font-unit outlines (y up) onto the page (y down).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{compose, ComposeOptions, SidebarPosition};
    use crate::geometry::PageGeometry;
    use crate::pagination::compute_pages;
    use std::io::Cursor;

    fn red_square_data_uri() -> String {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64_STD.encode(png))
    }

    fn capture(frame: &PageFrame<'_>, images: &ImageStore, chrome: bool) -> RgbaImage {
        let ctx = CaptureContext {
            pixel_ratio: 1.0,
            include_chrome: chrome,
            background: Rgba::WHITE,
            images,
        };
        SkiaRasterizer::new(Arc::new(FontManager::default()))
            .rasterize(frame, &ctx)
            .unwrap()
    }

    #[test]
    fn content_is_clipped_to_page_slice() {
        let geometry = PageGeometry::a4();
        let mut content = ContentBlock::new(794.0);
        // A black block straddling the first page break.
        content.push(ContentItem::Rect {
            x: 300.0,
            y: 1000.0,
            width: 100.0,
            height: 200.0,
            color: Rgba::BLACK,
        });
        let pages = compute_pages(Some(content.measured_height()), &[], &geometry);
        let frames = compose(&content, &pages, &geometry, Sidebar::None, ComposeOptions::SCREEN);
        let store = ImageStore::new();

        let first = capture(&frames[0], &store, false);
        assert_eq!(first.get_pixel(350, 1050).0, [0, 0, 0, 255]);
        // Below the first page's slice (bottom padding) stays white.
        assert_eq!(first.get_pixel(350, 1100).0, [255, 255, 255, 255]);

        let second = capture(&frames[1], &store, false);
        // Content y=1150 lands at 40 + (1150 - 1091) on page two.
        assert_eq!(second.get_pixel(350, 99).0, [0, 0, 0, 255]);
        // The top padding band is clipped.
        assert_eq!(second.get_pixel(350, 20).0, [255, 255, 255, 255]);
    }

    #[test]
    fn sidebar_fills_full_height() {
        let geometry = PageGeometry::a4();
        let content = ContentBlock {
            height: Some(100.0),
            ..ContentBlock::new(794.0)
        };
        let pages = compute_pages(Some(100.0), &[], &geometry);
        let sidebar = Sidebar::Band {
            width: 280.0,
            color: Rgba::from_hex("#2c3e50").unwrap(),
            position: SidebarPosition::Left,
        };
        let frames = compose(&content, &pages, &geometry, sidebar, ComposeOptions::SCREEN);
        let img = capture(&frames[0], &ImageStore::new(), false);
        assert_eq!(img.get_pixel(10, 1110).0, [0x2c, 0x3e, 0x50, 255]);
        assert_eq!(img.get_pixel(400, 1110).0, [255, 255, 255, 255]);
    }

    #[test]
    fn pixel_ratio_scales_bitmap() {
        let geometry = PageGeometry::a4();
        let content = ContentBlock::new(794.0);
        let pages = compute_pages(Some(0.0), &[], &geometry);
        let frames = compose(&content, &pages, &geometry, Sidebar::None, ComposeOptions::SCREEN);
        let store = ImageStore::new();
        let ctx = CaptureContext {
            pixel_ratio: 2.0,
            include_chrome: true,
            background: Rgba::WHITE,
            images: &store,
        };
        let img = SkiaRasterizer::new(Arc::new(FontManager::default()))
            .rasterize(&frames[0], &ctx)
            .unwrap();
        assert_eq!(img.dimensions(), (1588, 2246));
    }

    #[test]
    fn data_uri_images_load_and_draw() {
        let geometry = PageGeometry::a4();
        let src = red_square_data_uri();
        let mut content = ContentBlock::new(794.0);
        content.push(ContentItem::Image {
            x: 100.0,
            y: 100.0,
            width: 40.0,
            height: 40.0,
            src: src.clone(),
        });
        let store = ImageStore::load(&content).unwrap();
        assert_eq!(store.len(), 1);

        let pages = compute_pages(Some(content.measured_height()), &[], &geometry);
        let frames = compose(&content, &pages, &geometry, Sidebar::None, ComposeOptions::SCREEN);
        let img = capture(&frames[0], &store, false);
        assert_eq!(img.get_pixel(120, 120).0, [255, 0, 0, 255]);
    }

    #[test]
    fn broken_image_fails_to_load() {
        let mut content = ContentBlock::new(794.0);
        content.push(ContentItem::Image {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            src: "data:image/png;base64,!!!".to_string(),
        });
        assert!(matches!(
            ImageStore::load(&content),
            Err(ExportError::ImageLoad { .. })
        ));
    }

    #[test]
    fn chrome_draws_footer_only_when_requested() {
        let geometry = PageGeometry::a4();
        let content = ContentBlock {
            height: Some(10.0),
            ..ContentBlock::new(794.0)
        };
        let pages = compute_pages(Some(10.0), &[], &geometry);
        let frames = compose(&content, &pages, &geometry, Sidebar::None, ComposeOptions::SCREEN);
        let store = ImageStore::new();

        let footer_band = |img: &RgbaImage| {
            (1095..1115).any(|y| (370..424).any(|x| img.get_pixel(x, y).0 != [255, 255, 255, 255]))
        };
        assert!(footer_band(&capture(&frames[0], &store, true)));
        assert!(!footer_band(&capture(&frames[0], &store, false)));
    }
}
