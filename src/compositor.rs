//! Page compositor – one fixed-size frame per page descriptor.
//!
//! A frame never copies content: it borrows the shared [`ContentBlock`] and
//! records which slice of it shows through the frame's viewport.

use serde::{Deserialize, Serialize};

use crate::content::{ContentBlock, Rgba};
use crate::geometry::PageGeometry;
use crate::pagination::PageDescriptor;

/// Attribute every page frame carries so the exporter can discover it.
pub const PAGE_FRAME_ATTR: &str = "data-page-frame";

/// Which edge the sidebar band hugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidebarPosition {
    #[default]
    Left,
    Right,
}

/// Full-height coloured band painted beneath the content on every page.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sidebar {
    #[default]
    None,
    Band {
        width: f32,
        color: Rgba,
        #[serde(default)]
        position: SidebarPosition,
    },
}

impl Sidebar {
    /// Horizontal span `(x, width)` of the band on a page `page_width` px wide.
    pub fn span(&self, page_width: f32) -> Option<(f32, f32)> {
        match *self {
            Sidebar::None => None,
            Sidebar::Band { width, position, .. } => {
                let width = width.clamp(0.0, page_width);
                match position {
                    SidebarPosition::Left => Some((0.0, width)),
                    SidebarPosition::Right => Some((page_width - width, width)),
                }
            }
        }
    }
}

/// Machine-discoverable marker on a page frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTag {
    pub attribute: &'static str,
    pub index: usize,
}

/// The clipped window through which a frame shows its content slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Top of the window inside the frame.
    pub top: f32,
    /// Height of the window (the descriptor's view height).
    pub height: f32,
}

/// Presentation-only decoration that must not reach exported output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chrome {
    pub shadow: bool,
    pub corner_radius: f32,
}

impl Chrome {
    pub const NONE: Self = Self {
        shadow: false,
        corner_radius: 0.0,
    };
    pub const SCREEN: Self = Self {
        shadow: true,
        corner_radius: 4.0,
    };
}

/// Options that differ between the interactive stack and thumbnails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeOptions {
    pub page_numbers: bool,
    pub chrome: Chrome,
    /// Render only the first descriptor.
    pub first_page_only: bool,
}

impl ComposeOptions {
    pub const SCREEN: Self = Self {
        page_numbers: true,
        chrome: Chrome::SCREEN,
        first_page_only: false,
    };
    pub const THUMBNAIL: Self = Self {
        page_numbers: false,
        chrome: Chrome::NONE,
        first_page_only: true,
    };
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self::SCREEN
    }
}

/// One rendered page: `width × height` px, sidebar beneath, clipped content
/// slice above it and an optional footer on top.
#[derive(Debug, Clone)]
pub struct PageFrame<'a> {
    pub tag: FrameTag,
    pub width: f32,
    pub height: f32,
    pub sidebar: Sidebar,
    pub viewport: Viewport,
    /// How far the content block is shifted up inside the viewport.
    pub content_offset: f32,
    pub content: &'a ContentBlock,
    pub footer: Option<String>,
    pub chrome: Chrome,
}

impl PageFrame<'_> {
    pub fn index(&self) -> usize {
        self.tag.index
    }

    /// Vertical translation that maps content coordinates into the frame.
    pub fn content_translation(&self) -> f32 {
        self.viewport.top - self.content_offset
    }
}

/// Footer text for page `index` of `count`.
pub fn footer_label(index: usize, count: usize) -> String {
    if count > 1 {
        format!("Page {} of {}", index + 1, count)
    } else {
        format!("Page {}", index + 1)
    }
}

/// Build the frames for `pages`, in descriptor order.
pub fn compose<'a>(
    content: &'a ContentBlock,
    pages: &[PageDescriptor],
    geometry: &PageGeometry,
    sidebar: Sidebar,
    options: ComposeOptions,
) -> Vec<PageFrame<'a>> {
    let count = pages.len();
    let visible = if options.first_page_only {
        &pages[..count.min(1)]
    } else {
        pages
    };

    visible
        .iter()
        .enumerate()
        .map(|(position, page)| {
            debug_assert_eq!(position, page.index, "descriptors must be in index order");
            PageFrame {
                tag: FrameTag {
                    attribute: PAGE_FRAME_ATTR,
                    index: page.index,
                },
                width: geometry.page_width,
                height: geometry.page_height,
                sidebar,
                viewport: Viewport {
                    top: geometry.viewport_top(page.index),
                    height: page.view_height,
                },
                content_offset: page.offset,
                content,
                footer: options
                    .page_numbers
                    .then(|| footer_label(page.index, count)),
                chrome: options.chrome,
            }
        })
        .collect()
}
