//! Paginated view and the stage that hosts mounted views.
//!
//! A [`PaginatedView`] owns what the on-screen page stack needs: the mounted
//! content, the current page descriptors, the display scale and the debounced
//! measurement schedule. A [`Stage`] maps content-root identifiers to views
//! and carries the document-wide chrome override used during export.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::compositor::{compose, ComposeOptions, PageFrame, Sidebar};
use crate::content::ContentBlock;
use crate::error::LayoutError;
use crate::geometry::PageGeometry;
use crate::pagination::{
    compute_pages, LayoutScheduler, PageDescriptor, MOUNT_SETTLE, OBSERVE_SETTLE,
};
use crate::scale::{ScaleController, ScaleMode};

/// Vertical gap between stacked pages on screen, in unscaled px.
pub const PAGE_GAP: f32 = 32.0;

pub struct PaginatedView {
    geometry: PageGeometry,
    sidebar: Sidebar,
    scale: ScaleController,
    content: Option<ContentBlock>,
    pages: Vec<PageDescriptor>,
    current_scale: f32,
    scheduler: LayoutScheduler,
}

impl PaginatedView {
    /// A view with nothing mounted. Fails if `geometry` is invalid.
    pub fn new(
        geometry: PageGeometry,
        sidebar: Sidebar,
        mode: ScaleMode,
    ) -> Result<Self, LayoutError> {
        geometry.validate()?;
        let scale = ScaleController::new(mode, geometry.page_width);
        Ok(Self {
            geometry,
            sidebar,
            current_scale: scale.initial(),
            scale,
            content: None,
            pages: compute_pages(None, &[], &geometry),
            scheduler: LayoutScheduler::new(),
        })
    }

    /// Mount content; the first measurement runs after [`MOUNT_SETTLE`].
    pub fn mount(&mut self, content: ContentBlock, now: Instant) {
        self.content = Some(content);
        self.scheduler.notify(now, MOUNT_SETTLE);
    }

    /// Replace the mounted content (e.g. after an edit or an image load).
    pub fn replace_content(&mut self, content: ContentBlock, now: Instant) {
        self.content = Some(content);
        self.scheduler.notify(now, OBSERVE_SETTLE);
    }

    /// Unmount the content; pagination falls back to a single page.
    pub fn unmount(&mut self) {
        self.content = None;
        self.scheduler.cancel();
        self.pages = compute_pages(None, &[], &self.geometry);
    }

    /// The container was resized. The scale follows immediately; the page
    /// boundaries are re-measured once the resize settles.
    pub fn resize(&mut self, container_width: f32, now: Instant) {
        self.current_scale = self.scale.scale_for(container_width);
        self.scheduler.notify(now, OBSERVE_SETTLE);
    }

    /// Run the pending measurement if it is due. Returns whether the
    /// descriptors were recomputed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.scheduler.take_due(now) {
            return false;
        }
        self.measure();
        true
    }

    /// Measure immediately, discarding any pending schedule.
    pub fn settle(&mut self) {
        self.scheduler.cancel();
        self.measure();
    }

    fn measure(&mut self) {
        self.pages = match &self.content {
            Some(content) => compute_pages(
                Some(content.measured_height()),
                &content.markers,
                &self.geometry,
            ),
            None => compute_pages(None, &[], &self.geometry),
        };
    }

    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn sidebar(&self) -> Sidebar {
        self.sidebar
    }

    pub fn content(&self) -> Option<&ContentBlock> {
        self.content.as_ref()
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn scale(&self) -> f32 {
        self.current_scale
    }

    /// Number of frames actually shown (thumbnails show one).
    pub fn display_page_count(&self) -> usize {
        if self.scale.is_thumbnail() {
            1
        } else {
            self.page_count()
        }
    }

    /// `"3 pages • A4 Format"`.
    pub fn page_indicator(&self) -> String {
        let count = self.page_count();
        format!(
            "{count} page{} • A4 Format",
            if count > 1 { "s" } else { "" }
        )
    }

    /// On-screen height of the scaled page stack, gaps included.
    pub fn stacked_height(&self) -> f32 {
        let count = self.display_page_count() as f32;
        let gaps = if self.scale.is_thumbnail() {
            0.0
        } else {
            PAGE_GAP * (count - 1.0).max(0.0)
        };
        (self.geometry.page_height * count + gaps) * self.current_scale
    }

    /// Composite the current pages. Empty when no content is mounted.
    pub fn frames(&self) -> Vec<PageFrame<'_>> {
        let Some(content) = &self.content else {
            return Vec::new();
        };
        let options = if self.scale.is_thumbnail() {
            ComposeOptions::THUMBNAIL
        } else {
            ComposeOptions::SCREEN
        };
        compose(content, &self.pages, &self.geometry, self.sidebar, options)
    }
}

/// Hosts mounted views by content-root identifier.
#[derive(Default)]
pub struct Stage {
    roots: BTreeMap<String, PaginatedView>,
    chrome_overrides: AtomicUsize,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, root_id: impl Into<String>, view: PaginatedView) {
        self.roots.insert(root_id.into(), view);
    }

    pub fn remove(&mut self, root_id: &str) -> Option<PaginatedView> {
        self.roots.remove(root_id)
    }

    pub fn root(&self, root_id: &str) -> Option<&PaginatedView> {
        self.roots.get(root_id)
    }

    pub fn root_mut(&mut self, root_id: &str) -> Option<&mut PaginatedView> {
        self.roots.get_mut(root_id)
    }

    /// Whether presentation chrome (footers, shadows) is currently suppressed.
    pub fn chrome_suppressed(&self) -> bool {
        self.chrome_overrides.load(Ordering::SeqCst) > 0
    }

    /// Suppress presentation chrome until the returned guard is dropped.
    pub fn suppress_chrome(&self) -> ChromeOverride<'_> {
        self.chrome_overrides.fetch_add(1, Ordering::SeqCst);
        ChromeOverride { stage: self }
    }
}

/// Scoped chrome suppression; released on drop, including unwinding.
#[must_use = "chrome is restored as soon as the override is dropped"]
pub struct ChromeOverride<'a> {
    stage: &'a Stage,
}

impl Drop for ChromeOverride<'_> {
    fn drop(&mut self) {
        self.stage.chrome_overrides.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn block(height: f32) -> ContentBlock {
        ContentBlock {
            height: Some(height),
            ..ContentBlock::new(794.0)
        }
    }

    fn view() -> PaginatedView {
        PaginatedView::new(PageGeometry::a4(), Sidebar::None, ScaleMode::default()).unwrap()
    }

    #[test]
    fn unmounted_view_has_one_page_and_no_frames() {
        let v = view();
        assert_eq!(v.page_count(), 1);
        assert!(v.frames().is_empty());
    }

    #[test]
    fn measurement_waits_for_settle() {
        let t0 = Instant::now();
        let mut v = view();
        v.mount(block(2800.0), t0);
        assert!(!v.poll(t0 + Duration::from_millis(50)));
        assert_eq!(v.page_count(), 1);
        assert!(v.poll(t0 + MOUNT_SETTLE));
        assert_eq!(v.page_count(), 3);
    }

    #[test]
    fn only_latest_content_is_measured() {
        let t0 = Instant::now();
        let mut v = view();
        v.mount(block(800.0), t0);
        v.replace_content(block(4000.0), t0 + Duration::from_millis(20));
        assert!(v.poll(t0 + Duration::from_millis(120)));
        assert_eq!(v.pages().iter().map(|p| p.view_height).sum::<f32>(), 4000.0);
    }

    #[test]
    fn resize_changes_scale_but_not_pages() {
        let t0 = Instant::now();
        let mut v = view();
        v.mount(block(2800.0), t0);
        v.settle();
        let before = v.pages().to_vec();

        v.resize(400.0, t0);
        assert!(v.scale() < 0.75);
        assert!(v.poll(t0 + OBSERVE_SETTLE));
        assert_eq!(v.pages(), before.as_slice());
    }

    #[test]
    fn indicator_and_stack_height() {
        let mut v = view();
        v.mount(block(2800.0), Instant::now());
        v.settle();
        assert_eq!(v.page_indicator(), "3 pages • A4 Format");
        let expected = (1123.0 * 3.0 + 64.0) * 0.75;
        assert!((v.stacked_height() - expected).abs() < 1e-3);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let geometry = PageGeometry {
            top_padding: 1100.0,
            ..PageGeometry::a4()
        };
        let result = PaginatedView::new(geometry, Sidebar::None, ScaleMode::default());
        assert!(matches!(result, Err(LayoutError::InvalidGeometry(_))));
    }

    #[test]
    fn replaced_content_is_pending_until_polled() {
        let t0 = Instant::now();
        let mut v = view();
        v.mount(block(800.0), t0);
        v.settle();
        assert!(!v.is_pending());
        v.replace_content(block(4000.0), t0);
        assert!(v.is_pending());
        assert_eq!(v.page_count(), 1);
        assert!(v.poll(t0 + OBSERVE_SETTLE));
        assert!(!v.is_pending());
        assert_eq!(v.page_count(), 4);
    }

    #[test]
    fn chrome_override_is_scoped() {
        let stage = Stage::new();
        {
            let _outer = stage.suppress_chrome();
            {
                let _inner = stage.suppress_chrome();
                assert!(stage.chrome_suppressed());
            }
            assert!(stage.chrome_suppressed());
        }
        assert!(!stage.chrome_suppressed());
    }
}
