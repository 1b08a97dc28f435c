//! Error types shared by the layout engine and the export pipeline.

use std::io;
use thiserror::Error;

/// Result type alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Text shown to the user whenever an export fails, regardless of cause.
pub const EXPORT_FALLBACK_HINT: &str =
    "Please try your viewer's print function (Ctrl/Cmd + P) and select 'Save as PDF'.";

/// Errors raised while validating page geometry or loading content.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// The page geometry violates `page_height > top_padding + bottom_padding`
    /// or carries a non-positive dimension.
    #[error("invalid page geometry: {0}")]
    InvalidGeometry(String),

    /// The content needs more pages than a document may have.
    #[error("content of {height}px does not fit in {max_pages} pages")]
    ContentTooTall { height: f32, max_pages: usize },

    /// A content block or résumé document could not be decoded.
    #[error("invalid content JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single page frame could not be turned into a bitmap.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct RasterError(pub String);

/// Errors raised by the export pipeline. Every variant aborts the whole
/// export; no partial document is ever produced.
#[derive(Error, Debug)]
pub enum ExportError {
    /// No view is mounted under the requested content-root identifier.
    #[error("content root '{0}' not found")]
    RootNotFound(String),

    /// The content root has no page frames to capture.
    #[error("content root '{0}' has no page frames")]
    NoPages(String),

    /// The view changed since its pages were last measured.
    #[error("content root '{0}' has a layout update pending")]
    LayoutPending(String),

    /// The measured pages do not cover the content.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Another export is still in flight.
    #[error("an export is already in progress")]
    Busy,

    /// An image referenced by the content failed to load.
    #[error("image '{src}' failed to load: {reason}")]
    ImageLoad { src: String, reason: String },

    /// Rasterizing one page frame failed.
    #[error("capture of page {page} failed: {source}")]
    Capture {
        page: usize,
        #[source]
        source: RasterError,
    },

    /// Packaging the captured pages into the output document failed.
    #[error("document assembly failed: {0}")]
    Assembly(String),

    /// Writing the finished artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    /// The single user-facing notice for a failed export, including the
    /// manual fallback instruction.
    pub fn user_message(&self) -> String {
        match self {
            ExportError::RootNotFound(_) | ExportError::NoPages(_) => {
                "Could not find resume content. Please try again.".to_string()
            }
            ExportError::LayoutPending(_) => {
                "The preview is still updating. Please try again in a moment.".to_string()
            }
            ExportError::Busy => {
                "A PDF is already being generated. Please wait for it to finish.".to_string()
            }
            _ => format!("PDF generation failed. {EXPORT_FALLBACK_HINT}"),
        }
    }
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Layout(LayoutError::Json(err))
    }
}
