//! Pipeline – ties together pagination, composition, capture and assembly
//! into single function calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compositor::Sidebar;
use crate::content::ContentBlock;
use crate::error::{LayoutError, Result};
use crate::export::{ExportArtifact, ExportOptions, Exporter, DEFAULT_PIXEL_RATIO};
use crate::fonts::FontManager;
use crate::geometry::{PageGeometry, PhysicalPage};
use crate::pagination::{compute_pages, covers, PageDescriptor, MAX_PAGES};
use crate::raster::SkiaRasterizer;
use crate::resume::Resume;
use crate::scale::ScaleMode;
use crate::templates::{get_template, render_resume};
use crate::view::{PaginatedView, Stage};

/// Identifier the preview mounts the printable résumé under.
pub const PRINT_ROOT_ID: &str = "resume-print-area";

/// Configuration for the export pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata (default: "Resume").
    pub title: String,
    /// On-screen page geometry (default: A4 at 96 dpi).
    pub geometry: PageGeometry,
    /// Physical output page size (default: A4).
    pub physical: PhysicalPage,
    /// Oversampling factor for captured pages (default: 2).
    pub pixel_ratio: f32,
    /// Suggested artifact filename.
    pub filename: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "Resume".to_string(),
            geometry: PageGeometry::a4(),
            physical: PhysicalPage::a4(),
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            filename: "resume.pdf".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Filename derived from a person's name: `"Alex Johnson"` → `Alex_Johnson_Resume.pdf`.
    pub fn filename_for(full_name: &str) -> String {
        let stem = full_name.split_whitespace().collect::<Vec<_>>().join("_");
        if stem.is_empty() {
            "resume.pdf".to_string()
        } else {
            format!("{stem}_Resume.pdf")
        }
    }

    fn export_options(&self) -> ExportOptions {
        ExportOptions {
            title: self.title.clone(),
            physical: self.physical,
            pixel_ratio: self.pixel_ratio,
            ..ExportOptions::default()
        }
    }
}

/// Page layout of a content block, as reported to tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutReport {
    pub page_count: usize,
    pub content_height: f32,
    pub geometry: PageGeometry,
    pub pages: Vec<PageDescriptor>,
}

impl LayoutReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Page descriptors for a content block under `geometry`.
///
/// Fails with [`LayoutError::ContentTooTall`] when the content would need
/// more than [`MAX_PAGES`] pages.
pub fn paginate_content(content: &ContentBlock, geometry: &PageGeometry) -> Result<Vec<PageDescriptor>> {
    geometry.validate()?;
    let height = content.measured_height();
    let pages = compute_pages(Some(height), &content.markers, geometry);
    if !covers(&pages, height) {
        return Err(LayoutError::ContentTooTall {
            height,
            max_pages: MAX_PAGES,
        }
        .into());
    }
    Ok(pages)
}

pub fn layout_report(content: &ContentBlock, geometry: &PageGeometry) -> Result<LayoutReport> {
    let pages = paginate_content(content, geometry)?;
    Ok(LayoutReport {
        page_count: pages.len(),
        content_height: content.measured_height(),
        geometry: *geometry,
        pages,
    })
}

/// Full pipeline: content block → image-based PDF.
///
/// The content is mounted on a fresh stage under [`PRINT_ROOT_ID`], measured
/// without waiting for the settle delay, then captured page by page.
pub fn export_content(
    content: ContentBlock,
    sidebar: Sidebar,
    config: &PipelineConfig,
    fonts: Arc<FontManager>,
) -> Result<ExportArtifact> {
    paginate_content(&content, &config.geometry)?;

    let mut view = PaginatedView::new(config.geometry, sidebar, ScaleMode::default())?;
    view.mount(content, std::time::Instant::now());
    view.settle();
    log::debug!("{} before export", view.page_indicator());

    let mut stage = Stage::new();
    stage.insert(PRINT_ROOT_ID, view);

    let exporter = Exporter::new(SkiaRasterizer::new(fonts), config.export_options());
    Ok(exporter.export(&stage, PRINT_ROOT_ID, &config.filename)?)
}

/// Render a résumé with the template `template_id` and export it.
pub fn export_resume(
    resume: &Resume,
    template_id: &str,
    config: &PipelineConfig,
    fonts: Arc<FontManager>,
) -> Result<ExportArtifact> {
    let template = get_template(template_id);
    let content = render_resume(resume, template, &fonts);
    export_content(content, template.sidebar, config, fonts)
}
