//! Pagination – splits one continuous content block into fixed-size pages.
//!
//! Handles:
//! - first-page vs. continuation-page usable heights
//! - orphan avoidance for section headings near a page bottom
//! - a guaranteed fallback page when the content cannot be measured
//! - debounced re-measurement after content or container changes

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::content::SectionMarker;
use crate::geometry::PageGeometry;

/// Settle delay before the first measurement after mounting.
pub const MOUNT_SETTLE: Duration = Duration::from_millis(100);
/// Settle delay after a content or resize observation.
pub const OBSERVE_SETTLE: Duration = Duration::from_millis(50);

/// Upper bound on the pages one document may produce.
pub const MAX_PAGES: usize = 500;

/// One page's slice of the continuous content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub index: usize,
    /// Distance from the content origin to the top of this slice.
    pub offset: f32,
    /// Height of the visible slice.
    pub view_height: f32,
}

impl PageDescriptor {
    /// Content offset of the slice's bottom edge.
    pub fn end(&self) -> f32 {
        self.offset + self.view_height
    }
}

/// Partition `content_height` px of content into pages.
///
/// `None` (or a non-finite height) means the content could not be measured;
/// the result is then a single full-height page. The function is pure and
/// returns at least one page.
///
/// The loop stops early, leaving the tail of the content uncovered, when a
/// page has no usable height (invalid geometry) or [`MAX_PAGES`] is reached.
/// Use [`covers`] to detect that case.
pub fn compute_pages(
    content_height: Option<f32>,
    markers: &[SectionMarker],
    geometry: &PageGeometry,
) -> Vec<PageDescriptor> {
    let Some(content_height) = content_height.filter(|h| h.is_finite()) else {
        log::debug!("content not measurable, falling back to a single page");
        return vec![PageDescriptor {
            index: 0,
            offset: 0.0,
            view_height: geometry.max_visible(0),
        }];
    };

    let mut pages = Vec::new();
    let mut remaining = content_height;
    let mut offset = 0.0f32;

    while remaining > 0.0 {
        let index = pages.len();
        if index == MAX_PAGES {
            log::warn!("content of {content_height}px exceeds {MAX_PAGES} pages, truncating");
            break;
        }
        let mut candidate = geometry.max_visible(index).min(remaining);
        if candidate.is_nan() || candidate <= 0.0 || offset + candidate == offset {
            log::warn!("page {index} has no usable height, stopping pagination");
            break;
        }
        let page_bottom = offset + candidate;
        let danger_start = page_bottom - geometry.orphan_threshold;

        for marker in markers {
            let m = marker.vertical_offset;
            if m > danger_start && m < page_bottom {
                let shortened = m - offset;
                // A heading near the top of its page stays put.
                if shortened >= geometry.min_slice_height {
                    candidate = candidate.min(shortened);
                }
            }
        }

        pages.push(PageDescriptor {
            index,
            offset,
            view_height: candidate,
        });
        offset += candidate;
        remaining -= candidate;
    }

    if pages.is_empty() {
        pages.push(PageDescriptor {
            index: 0,
            offset: 0.0,
            view_height: content_height.max(0.0).min(geometry.max_visible(0)),
        });
    }

    log::debug!(
        "paginated {content_height}px of content into {} page(s)",
        pages.len()
    );
    pages
}

/// Whether `pages` cover all `content_height` px of content, up to
/// sub-pixel rounding.
pub fn covers(pages: &[PageDescriptor], content_height: f32) -> bool {
    let end = pages.last().map(PageDescriptor::end).unwrap_or(0.0);
    content_height - end < 1.0
}

/// Debounces layout measurement.
///
/// Every notification pushes the deadline out; a measurement is due only
/// once the most recent notification has settled. Older pending
/// measurements are superseded, never merged.
#[derive(Debug, Clone, Default)]
pub struct LayoutScheduler {
    deadline: Option<Instant>,
    generation: u64,
}

impl LayoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content or size change observed at `now`.
    pub fn notify(&mut self, now: Instant, settle: Duration) {
        self.deadline = Some(now + settle);
        self.generation += 1;
    }

    /// Whether a measurement is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Number of notifications seen so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consume the pending measurement if its settle delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending measurement.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
