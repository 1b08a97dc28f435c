//! # resume-forge – paginated résumé preview and image-based PDF export
//!
//! A résumé is rendered once as a continuous [`ContentBlock`] and then cut
//! into fixed-size pages. The pipeline stages are:
//!
//! 1. **Render** – résumé document → positioned content ([`templates`])
//! 2. **Paginate** – content height + section markers → page slices,
//!    keeping headings off page bottoms ([`pagination`])
//! 3. **Composite** – one viewport frame per slice ([`compositor`], [`view`])
//! 4. **Capture** – rasterize each frame with tiny-skia ([`raster`])
//! 5. **Assemble** – one full-page image per PDF page via printpdf ([`export`])
//!
//! [`pipeline`] wires the stages together; a C-compatible FFI surface is
//! exposed via the [`ffi`] module.

pub mod compositor;
pub mod content;
pub mod error;
pub mod export;
pub mod ffi;
pub mod fonts;
pub mod geometry;
pub mod pagination;
pub mod pipeline;
pub mod raster;
pub mod resume;
pub mod scale;
pub mod templates;
pub mod view;

// Re-exports for convenience
pub use content::{ContentBlock, ContentItem, Rgba, SectionMarker, TextRun};
pub use error::{Error, ExportError, LayoutError, Result};
pub use export::{ExportArtifact, Exporter};
pub use geometry::PageGeometry;
pub use pagination::{compute_pages, PageDescriptor};
pub use pipeline::{export_content, export_resume, layout_report, PipelineConfig};
