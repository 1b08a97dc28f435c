//! Integration tests for the resume-forge pipeline.
//!
//! These tests validate:
//! - Page boundaries for the reference scenarios
//! - Coverage and heading-orphan properties over generated inputs
//! - Display scale never moves page boundaries
//! - Exported PDFs have one full-page image per page
//! - Rasterization is deterministic

use std::sync::Arc;
use std::time::{Duration, Instant};

use lopdf::{Document, Object};
use sha2::{Digest, Sha256};

use resume_forge::compositor::{compose, ComposeOptions, Sidebar};
use resume_forge::content::{ContentBlock, ContentItem, Rgba, SectionMarker};
use resume_forge::fonts::FontManager;
use resume_forge::geometry::PageGeometry;
use resume_forge::pagination::{compute_pages, PageDescriptor};
use resume_forge::pipeline::{export_content, export_resume, layout_report, PipelineConfig};
use resume_forge::raster::{CaptureContext, ImageStore, Rasterizer, SkiaRasterizer};
use resume_forge::resume::{Experience, Resume};
use resume_forge::scale::ScaleMode;
use resume_forge::templates::{get_template, render_resume};
use resume_forge::view::PaginatedView;

// =====================================================================
// Helpers
// =====================================================================

fn flat_geometry() -> PageGeometry {
    PageGeometry {
        top_padding: 0.0,
        ..PageGeometry::a4()
    }
}

fn heights(pages: &[PageDescriptor]) -> Vec<f32> {
    pages.iter().map(|p| p.view_height).collect()
}

fn markers(offsets: &[f32]) -> Vec<SectionMarker> {
    offsets.iter().copied().map(SectionMarker::at).collect()
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        pixel_ratio: 0.25,
        ..PipelineConfig::default()
    }
}

fn fonts() -> Arc<FontManager> {
    Arc::new(FontManager::default())
}

fn striped_block(height: f32) -> ContentBlock {
    let mut block = ContentBlock::new(794.0);
    let mut y = 0.0;
    while y < height {
        block.push(ContentItem::Rect {
            x: 320.0,
            y,
            width: 400.0,
            height: 20.0,
            color: Rgba::from_hex("#2c3e50").unwrap(),
        });
        y += 60.0;
    }
    block.height = Some(height);
    block
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn image_xobject_count(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter(|obj| match obj {
            Object::Stream(stream) => {
                stream.dict.get(b"Subtype").ok().and_then(|s| s.as_name().ok())
                    == Some(b"Image".as_slice())
            }
            _ => false,
        })
        .count()
}

/// Deterministic linear congruential generator.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn range(&mut self, lo: u32, hi: u32) -> u32 {
        lo + self.next() % (hi - lo)
    }
}

// =====================================================================
// Reference scenarios
// =====================================================================

#[test]
fn plain_content_without_top_padding() {
    let pages = compute_pages(Some(2800.0), &[], &flat_geometry());
    assert_eq!(heights(&pages), vec![1091.0, 1091.0, 618.0]);
    assert_eq!(pages[1].offset, 1091.0);
    assert_eq!(pages[2].offset, 2182.0);
}

#[test]
fn plain_content_a4_defaults() {
    let pages = compute_pages(Some(2800.0), &[], &PageGeometry::a4());
    assert_eq!(heights(&pages), vec![1091.0, 1051.0, 658.0]);
}

#[test]
fn heading_in_danger_zone_moves_to_next_page() {
    let pages = compute_pages(Some(2800.0), &markers(&[1080.0]), &flat_geometry());
    assert_eq!(pages[0].view_height, 1080.0);
    assert_eq!(pages[1].offset, 1080.0);
    let total: f32 = heights(&pages).iter().sum();
    assert_eq!(total, 2800.0);
}

#[test]
fn heading_at_content_end_starts_a_new_page() {
    let pages = compute_pages(Some(500.0), &markers(&[480.0]), &PageGeometry::a4());
    assert_eq!(heights(&pages), vec![480.0, 20.0]);
}

#[test]
fn heading_near_page_top_is_left_alone() {
    // Second page starts at 1091; a heading 60px into it is both in the
    // danger zone of the short last page and too close to its top.
    let pages = compute_pages(Some(1200.0), &markers(&[1151.0]), &flat_geometry());
    assert_eq!(heights(&pages), vec![1091.0, 109.0]);
}

#[test]
fn unmeasured_content_is_one_full_page() {
    let pages = compute_pages(None, &[], &PageGeometry::a4());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].view_height, 1091.0);

    let pages = compute_pages(Some(f32::NAN), &[], &PageGeometry::a4());
    assert_eq!(pages.len(), 1);
}

#[test]
fn empty_content_is_one_empty_page() {
    let pages = compute_pages(Some(0.0), &[], &PageGeometry::a4());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].view_height, 0.0);
}

// =====================================================================
// Properties over generated inputs
// =====================================================================

#[test]
fn pages_cover_content_exactly_once() {
    let geometry = PageGeometry::a4();
    let mut rng = Lcg(7);
    for _ in 0..200 {
        let height = rng.range(1, 9000) as f32;
        let mut offsets = Vec::new();
        let mut y = rng.range(0, 300) as f32;
        while y < height {
            offsets.push(y);
            y += rng.range(20, 700) as f32;
        }
        let pages = compute_pages(Some(height), &markers(&offsets), &geometry);

        let mut expected_offset = 0.0;
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.index, i);
            assert_eq!(page.offset, expected_offset);
            assert!(page.view_height > 0.0);
            assert!(page.view_height <= geometry.max_visible(i));
            expected_offset = page.end();
        }
        assert_eq!(expected_offset, height);
    }
}

#[test]
fn headings_never_sit_in_a_page_bottom_band() {
    let geometry = PageGeometry::a4();
    let mut rng = Lcg(42);
    for _ in 0..200 {
        let height = rng.range(500, 9000) as f32;
        let gap_floor = geometry.orphan_threshold as u32 + 1;
        let mut offsets = Vec::new();
        let mut y = rng.range(0, 400) as f32;
        while y < height {
            offsets.push(y);
            y += rng.range(gap_floor, 900) as f32;
        }
        let pages = compute_pages(Some(height), &markers(&offsets), &geometry);

        for page in &pages {
            let end = page.end();
            for &m in &offsets {
                let stranded = m > end - geometry.orphan_threshold && m < end;
                let near_top = m - page.offset < geometry.min_slice_height;
                assert!(
                    !stranded || near_top,
                    "heading at {m} stranded at bottom of page {page:?}"
                );
            }
        }
    }
}

#[test]
fn adding_content_never_removes_pages() {
    let geometry = PageGeometry::a4();
    let mut previous = 0;
    for height in (0..8000).step_by(37) {
        let count = compute_pages(Some(height as f32), &[], &geometry).len();
        assert!(count >= previous, "page count dropped at {height}px");
        previous = count;
    }
}

// =====================================================================
// View behaviour
// =====================================================================

#[test]
fn display_scale_does_not_move_page_boundaries() {
    let t0 = Instant::now();
    let mut view = PaginatedView::new(PageGeometry::a4(), Sidebar::None, ScaleMode::default()).unwrap();
    view.mount(striped_block(3100.0), t0);
    view.settle();
    let reference = view.pages().to_vec();

    for (i, width) in [320.0, 600.0, 900.0, 1600.0].into_iter().enumerate() {
        let now = t0 + Duration::from_millis(200 * (i as u64 + 1));
        view.resize(width, now);
        assert!(view.poll(now + Duration::from_millis(50)));
        assert_eq!(view.pages(), reference.as_slice());
    }
}

#[test]
fn thumbnail_shows_first_page_without_chrome() {
    let mut view = PaginatedView::new(PageGeometry::a4(), Sidebar::None, ScaleMode::Fixed(0.2)).unwrap();
    view.mount(striped_block(3100.0), Instant::now());
    view.settle();
    assert_eq!(view.page_count(), 3);
    let frames = view.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].footer.is_none());
    assert_eq!(view.scale(), 0.2);
}

// =====================================================================
// Export
// =====================================================================

#[test]
fn single_page_export_has_one_image_page() {
    let artifact = export_content(striped_block(600.0), Sidebar::None, &fast_config(), fonts()).unwrap();
    assert_valid_pdf(&artifact.bytes);
    assert_eq!(artifact.page_count, 1);

    let doc = Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    assert_eq!(image_xobject_count(&doc), 1);
}

#[test]
fn multi_page_export_matches_layout() {
    let content = striped_block(2800.0);
    let report = layout_report(&content, &PageGeometry::a4()).unwrap();
    assert_eq!(report.page_count, 3);

    let artifact = export_content(content, Sidebar::None, &fast_config(), fonts()).unwrap();
    assert_eq!(artifact.page_count, 3);
    let doc = Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
    assert_eq!(image_xobject_count(&doc), 3);
}

#[test]
fn broken_image_aborts_export() {
    let mut content = striped_block(600.0);
    content.push(ContentItem::Image {
        x: 10.0,
        y: 10.0,
        width: 50.0,
        height: 50.0,
        src: "/definitely/not/here.png".into(),
    });
    let err = export_content(content, Sidebar::None, &fast_config(), fonts()).unwrap_err();
    assert!(err.to_string().contains("not/here.png"), "{err}");
}

#[test]
fn long_resume_exports_every_page() {
    let mut resume = Resume::sample();
    resume.experience = (0..16)
        .map(|i| Experience {
            id: i.to_string(),
            company: format!("Company {i}"),
            position: "Platform Engineer".into(),
            start_date: "2015".into(),
            end_date: "2016".into(),
            current: false,
            description: vec![
                "Owned the deployment pipeline end to end".into(),
                "Cut build times in half across all services".into(),
                "Mentored new hires".into(),
            ],
        })
        .collect();

    let fonts = fonts();
    let template = get_template("professional");
    let content = render_resume(&resume, template, &fonts);
    let expected = layout_report(&content, &PageGeometry::a4()).unwrap().page_count;
    assert!(expected > 1);

    let artifact = export_resume(&resume, "professional", &fast_config(), fonts).unwrap();
    assert_eq!(artifact.page_count, expected);
    let doc = Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), expected);
}

// =====================================================================
// Rasterization
// =====================================================================

#[test]
fn rasterization_is_deterministic() {
    let content = striped_block(2800.0);
    let geometry = PageGeometry::a4();
    let pages = compute_pages(Some(content.measured_height()), &content.markers, &geometry);
    let sidebar = get_template("professional").sidebar;
    let frames = compose(&content, &pages, &geometry, sidebar, ComposeOptions::SCREEN);
    let images = ImageStore::new();
    let ctx = CaptureContext {
        pixel_ratio: 0.5,
        include_chrome: false,
        background: Rgba::WHITE,
        images: &images,
    };
    let rasterizer = SkiaRasterizer::new(fonts());

    let digest = |index: usize| {
        let bitmap = rasterizer.rasterize(&frames[index], &ctx).unwrap();
        Sha256::digest(bitmap.as_raw())
    };

    assert_eq!(digest(0), digest(0));
    assert_ne!(digest(0), digest(2));
}
