//! Export pipeline – captures the page frames of a mounted view and
//! assembles them into one image-based PDF at the physical page size.
//!
//! The pipeline stages are:
//!
//! 1. **Enumerate** – resolve the content root and collect its tagged frames
//! 2. **Load** – decode every image the content references
//! 3. **Capture** – rasterize each frame with chrome suppressed
//! 4. **Assemble** – one PDF page per bitmap, via printpdf
//!
//! Any failure aborts the whole export; the chrome override and the phase
//! machine are released on every exit path.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use image::RgbaImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, XObjectTransform,
};

use crate::compositor::PAGE_FRAME_ATTR;
use crate::content::Rgba;
use crate::error::{ExportError, LayoutError, RasterError};
use crate::geometry::{PhysicalPage, MM_PER_PT};
use crate::pagination::{covers, MAX_PAGES};
use crate::raster::{CaptureContext, ImageStore, Rasterizer};
use crate::view::Stage;

/// Default oversampling for print-quality output.
pub const DEFAULT_PIXEL_RATIO: f32 = 2.0;

/// Where an export currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    Capturing,
    Assembling,
}

/// Settings for one exporter.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Title embedded in the PDF metadata.
    pub title: String,
    pub physical: PhysicalPage,
    pub pixel_ratio: f32,
    pub background: Rgba,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: "Resume".to_string(),
            physical: PhysicalPage::a4(),
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            background: Rgba::WHITE,
        }
    }
}

/// The finished document, handed to the caller and then dropped.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl ExportArtifact {
    /// Write the artifact into `dir` under its filename.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.filename);
        self.save_as(&path)?;
        Ok(path)
    }

    /// Write the artifact to `path`, creating parent directories as needed.
    pub fn save_as(&self, path: &Path) -> Result<(), ExportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Drives exports. At most one export runs at a time; a second request
/// while one is in flight is rejected with [`ExportError::Busy`].
pub struct Exporter {
    rasterizer: Box<dyn Rasterizer>,
    options: ExportOptions,
    phase: Mutex<ExportPhase>,
}

/// Holds the exporter out of `Idle`; dropping it returns to `Idle`.
pub(crate) struct PhaseGuard<'a> {
    phase: &'a Mutex<ExportPhase>,
}

impl PhaseGuard<'_> {
    fn advance(&self, next: ExportPhase) {
        *lock(self.phase) = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *lock(self.phase) = ExportPhase::Idle;
    }
}

fn lock(phase: &Mutex<ExportPhase>) -> MutexGuard<'_, ExportPhase> {
    // A poisoned phase only means a capture panicked; the value is still usable.
    phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Exporter {
    pub fn new(rasterizer: impl Rasterizer + 'static, options: ExportOptions) -> Self {
        Self {
            rasterizer: Box::new(rasterizer),
            options,
            phase: Mutex::new(ExportPhase::Idle),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn phase(&self) -> ExportPhase {
        *lock(&self.phase)
    }

    pub(crate) fn begin(&self) -> Result<PhaseGuard<'_>, ExportError> {
        let mut phase = lock(&self.phase);
        if *phase != ExportPhase::Idle {
            return Err(ExportError::Busy);
        }
        *phase = ExportPhase::Capturing;
        Ok(PhaseGuard { phase: &self.phase })
    }

    /// Export the view mounted under `root_id` as `filename`.
    pub fn export(
        &self,
        stage: &Stage,
        root_id: &str,
        filename: &str,
    ) -> Result<ExportArtifact, ExportError> {
        let result = self.run(stage, root_id, filename);
        match &result {
            Ok(artifact) => log::info!(
                "exported '{}' ({} page{}, {} bytes)",
                artifact.filename,
                artifact.page_count,
                if artifact.page_count == 1 { "" } else { "s" },
                artifact.bytes.len()
            ),
            Err(e) => log::error!("PDF generation error: {e}"),
        }
        result
    }

    /// Export and deliver the artifact to `path`.
    pub fn export_to_file(
        &self,
        stage: &Stage,
        root_id: &str,
        path: &Path,
    ) -> Result<ExportArtifact, ExportError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resume.pdf");
        let artifact = self.export(stage, root_id, filename)?;
        artifact.save_as(path)?;
        Ok(artifact)
    }

    fn run(
        &self,
        stage: &Stage,
        root_id: &str,
        filename: &str,
    ) -> Result<ExportArtifact, ExportError> {
        let phase = self.begin()?;

        let view = stage
            .root(root_id)
            .ok_or_else(|| ExportError::RootNotFound(root_id.to_string()))?;
        // Frames must re-walk the boundaries of the content actually mounted.
        if view.is_pending() {
            return Err(ExportError::LayoutPending(root_id.to_string()));
        }
        if let Some(content) = view.content() {
            let height = content.measured_height();
            if !covers(view.pages(), height) {
                return Err(LayoutError::ContentTooTall {
                    height,
                    max_pages: MAX_PAGES,
                }
                .into());
            }
        }
        let frames: Vec<_> = view
            .frames()
            .into_iter()
            .filter(|f| f.tag.attribute == PAGE_FRAME_ATTR)
            .collect();
        let Some(content) = frames.first().map(|f| f.content) else {
            return Err(ExportError::NoPages(root_id.to_string()));
        };

        let images = ImageStore::load(content)?;

        let bitmaps = {
            let _chrome = stage.suppress_chrome();
            let ctx = CaptureContext {
                pixel_ratio: self.options.pixel_ratio,
                include_chrome: !stage.chrome_suppressed(),
                background: self.options.background,
                images: &images,
            };
            let mut bitmaps = Vec::with_capacity(frames.len());
            for frame in &frames {
                log::debug!("capturing page {} of {}", frame.index() + 1, frames.len());
                let bitmap = self
                    .rasterizer
                    .rasterize(frame, &ctx)
                    .map_err(|source| ExportError::Capture {
                        page: frame.index(),
                        source,
                    })?;
                bitmaps.push(bitmap);
            }
            bitmaps
        };

        phase.advance(ExportPhase::Assembling);
        let bytes = assemble_pdf(&bitmaps, &self.options)?;

        Ok(ExportArtifact {
            filename: filename.to_string(),
            bytes,
            page_count: bitmaps.len(),
        })
    }
}

/// Assemble bitmaps into a PDF: page k holds bitmap k at full page size.
pub fn assemble_pdf(bitmaps: &[RgbaImage], options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    if bitmaps.is_empty() {
        return Err(ExportError::Assembly("no pages captured".to_string()));
    }

    let page_w = Mm(options.physical.width_mm);
    let page_h = Mm(options.physical.height_mm);
    let page_w_pt = options.physical.width_mm / MM_PER_PT;
    let page_h_pt = options.physical.height_mm / MM_PER_PT;

    let mut doc = PdfDocument::new(&options.title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pages = Vec::with_capacity(bitmaps.len());

    for (index, bitmap) in bitmaps.iter().enumerate() {
        let png = encode_png(bitmap)
            .map_err(|e| ExportError::Assembly(format!("page {index}: {}", e.0)))?;
        let raw = RawImage::decode_from_bytes(&png, &mut warnings)
            .map_err(|e| ExportError::Assembly(format!("page {index}: {e}")))?;
        let xobj_id = doc.add_image(&raw);

        let (px_w, px_h) = bitmap.dimensions();
        // At dpi=72 printpdf renders 1 px = 1 pt.
        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                dpi: Some(72.0),
                scale_x: Some(page_w_pt / px_w.max(1) as f32),
                scale_y: Some(page_h_pt / px_h.max(1) as f32),
                rotate: None,
            },
        }];
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    if !warnings.is_empty() {
        log::debug!("printpdf reported {} warning(s) while embedding pages", warnings.len());
    }

    doc.with_pages(pages);
    Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
}

/// Encode a captured page as an opaque PNG.
fn encode_png(bitmap: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    let rgb = image::DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| RasterError(format!("png encode failed: {e}")))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Instant;

    use crate::compositor::{PageFrame, Sidebar};
    use crate::content::ContentBlock;
    use crate::geometry::PageGeometry;
    use crate::scale::ScaleMode;
    use crate::view::PaginatedView;

    /// Records what it was asked to capture; optionally fails on one page.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<StdMutex<Vec<(usize, bool)>>>,
        fail_on: Option<usize>,
    }

    impl Rasterizer for Recorder {
        fn rasterize(
            &self,
            frame: &PageFrame<'_>,
            ctx: &CaptureContext<'_>,
        ) -> Result<RgbaImage, RasterError> {
            self.seen
                .lock()
                .unwrap()
                .push((frame.index(), ctx.include_chrome));
            if self.fail_on == Some(frame.index()) {
                return Err(RasterError("image failed to load".into()));
            }
            // Bitmap k is 8 + k px wide so pages can be told apart in the PDF.
            let shade = 255 - 40 * frame.index().min(6) as u8;
            Ok(RgbaImage::from_pixel(
                8 + frame.index() as u32,
                11,
                image::Rgba([shade, shade, shade, 255]),
            ))
        }
    }

    fn stage_with(height: f32) -> Stage {
        let mut view =
            PaginatedView::new(PageGeometry::a4(), Sidebar::None, ScaleMode::default()).unwrap();
        view.mount(
            ContentBlock {
                height: Some(height),
                ..ContentBlock::new(794.0)
            },
            Instant::now(),
        );
        view.settle();
        let mut stage = Stage::new();
        stage.insert("resume-print-area", view);
        stage
    }

    #[test]
    fn captures_every_page_in_order_without_chrome() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(recorder.clone(), ExportOptions::default());
        let stage = stage_with(2800.0);

        let artifact = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap();
        assert_eq!(artifact.page_count, 3);
        assert_eq!(&artifact.bytes[0..5], b"%PDF-");
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![(0, false), (1, false), (2, false)]
        );
        assert!(!stage.chrome_suppressed());
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a lopdf::Object) -> &'a lopdf::Object {
        match obj {
            lopdf::Object::Reference(id) => doc.get_object(*id).unwrap(),
            other => other,
        }
    }

    /// Width of the image drawn on each page, in page order.
    fn page_image_widths(pdf: &[u8]) -> Vec<i64> {
        let doc = lopdf::Document::load_mem(pdf).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let content =
                    lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
                let name = content
                    .operations
                    .iter()
                    .find(|op| op.operator == "Do")
                    .and_then(|op| op.operands.first())
                    .and_then(|operand| operand.as_name().ok())
                    .unwrap()
                    .to_vec();

                // Resources may be inherited from the page tree.
                let mut node = doc.get_dictionary(page_id).unwrap();
                let resources = loop {
                    if let Ok(res) = node.get(b"Resources") {
                        break resolve(&doc, res).as_dict().unwrap();
                    }
                    let parent = node.get(b"Parent").unwrap().as_reference().unwrap();
                    node = doc.get_dictionary(parent).unwrap();
                };
                let xobjects = resolve(&doc, resources.get(b"XObject").unwrap())
                    .as_dict()
                    .unwrap();
                let image = resolve(&doc, xobjects.get(&name).unwrap())
                    .as_stream()
                    .unwrap();
                image.dict.get(b"Width").unwrap().as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn pdf_page_k_holds_bitmap_k() {
        let exporter = Exporter::new(Recorder::default(), ExportOptions::default());
        let stage = stage_with(4000.0);

        let artifact = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap();
        assert_eq!(artifact.page_count, 4);
        assert_eq!(page_image_widths(&artifact.bytes), vec![8, 9, 10, 11]);
    }

    #[test]
    fn pending_layout_is_not_exported() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(recorder.clone(), ExportOptions::default());
        let mut stage = stage_with(800.0);
        let view = stage.root_mut("resume-print-area").unwrap();
        view.replace_content(
            ContentBlock {
                height: Some(2800.0),
                ..ContentBlock::new(794.0)
            },
            Instant::now(),
        );

        let err = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap_err();
        assert!(matches!(err, ExportError::LayoutPending(_)));
        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(exporter.phase(), ExportPhase::Idle);
        assert!(!stage.chrome_suppressed());

        stage.root_mut("resume-print-area").unwrap().settle();
        let artifact = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap();
        assert_eq!(artifact.page_count, 3);
    }

    #[test]
    fn content_beyond_page_limit_is_not_exported() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(recorder.clone(), ExportOptions::default());
        let stage = stage_with(1.0e9);

        let err = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Layout(LayoutError::ContentTooTall { .. })
        ));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_capture_aborts_and_cleans_up() {
        let recorder = Recorder {
            fail_on: Some(1),
            ..Recorder::default()
        };
        let exporter = Exporter::new(recorder.clone(), ExportOptions::default());
        let stage = stage_with(2800.0);

        let err = exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .unwrap_err();
        assert!(matches!(err, ExportError::Capture { page: 1, .. }));
        // No further pages are attempted after the failure.
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
        assert!(!stage.chrome_suppressed());
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[test]
    fn concurrent_export_is_rejected() {
        let exporter = Exporter::new(Recorder::default(), ExportOptions::default());
        let stage = stage_with(500.0);

        let in_flight = exporter.begin().unwrap();
        assert_eq!(exporter.phase(), ExportPhase::Capturing);
        assert!(matches!(
            exporter.export(&stage, "resume-print-area", "resume.pdf"),
            Err(ExportError::Busy)
        ));
        drop(in_flight);
        assert!(exporter
            .export(&stage, "resume-print-area", "resume.pdf")
            .is_ok());
    }

    #[test]
    fn unknown_root_is_reported() {
        let exporter = Exporter::new(Recorder::default(), ExportOptions::default());
        let err = exporter
            .export(&Stage::new(), "missing", "resume.pdf")
            .unwrap_err();
        assert!(matches!(err, ExportError::RootNotFound(_)));
        assert_eq!(exporter.phase(), ExportPhase::Idle);
    }

    #[test]
    fn unmounted_root_has_no_pages() {
        let mut stage = Stage::new();
        stage.insert(
            "empty",
            PaginatedView::new(PageGeometry::a4(), Sidebar::None, ScaleMode::default()).unwrap(),
        );
        let exporter = Exporter::new(Recorder::default(), ExportOptions::default());
        assert!(matches!(
            exporter.export(&stage, "empty", "resume.pdf"),
            Err(ExportError::NoPages(_))
        ));
    }

    #[test]
    fn assembling_nothing_fails() {
        assert!(matches!(
            assemble_pdf(&[], &ExportOptions::default()),
            Err(ExportError::Assembly(_))
        ));
    }
}
