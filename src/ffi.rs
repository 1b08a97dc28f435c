//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use the `extern "C"` calling convention and
//! `#[no_mangle]`; the header is generated into `include/rforge.h`.
//!
//! ## Memory management
//! - Buffers and strings returned through out-parameters live on the Rust heap.
//! - Callers **must** free them with `rforge_free_buffer` / `rforge_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Fallible functions return a `c_int`: `0` on success, otherwise one of
//!   the `RFORGE_ERR_*` codes.
//! - The message for the last failure on the calling thread is available
//!   from `rforge_last_error`.
//!
//! ## Usage from C
//! ```c
//! uint8_t *pdf; uint32_t len;
//! if (rforge_export_resume(json, json_len, "classic", NULL, &pdf, &len) == 0) {
//!     fwrite(pdf, 1, len, out);
//!     rforge_free_buffer(pdf, len);
//! } else {
//!     fprintf(stderr, "%s\n", rforge_last_error());
//! }
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;
use std::sync::{Arc, OnceLock};

use crate::compositor::{Sidebar, SidebarPosition};
use crate::content::{ContentBlock, Rgba};
use crate::error::{Error, ExportError, LayoutError};
use crate::fonts::FontManager;
use crate::geometry::PageGeometry;
use crate::pipeline::{export_content, export_resume, layout_report, PipelineConfig};
use crate::resume::Resume;

pub const RFORGE_OK: c_int = 0;
pub const RFORGE_ERR_NULL: c_int = 1;
pub const RFORGE_ERR_UTF8: c_int = 2;
pub const RFORGE_ERR_JSON: c_int = 3;
pub const RFORGE_ERR_LAYOUT: c_int = 4;
pub const RFORGE_ERR_EXPORT: c_int = 5;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Fonts are discovered once per process.
fn shared_fonts() -> Arc<FontManager> {
    static FONTS: OnceLock<Arc<FontManager>> = OnceLock::new();
    FONTS
        .get_or_init(|| Arc::new(FontManager::with_system_fonts()))
        .clone()
}

fn status_for(err: &Error) -> c_int {
    match err {
        Error::Layout(LayoutError::Json(_)) => RFORGE_ERR_JSON,
        Error::Layout(_) | Error::Export(ExportError::Layout(_)) => RFORGE_ERR_LAYOUT,
        Error::Export(_) | Error::Io(_) => RFORGE_ERR_EXPORT,
    }
}

fn fail(err: &Error) -> c_int {
    set_last_error(&err.to_string());
    status_for(err)
}

// ---------------------------------------------------------------------------
// C-compatible configuration types
// ---------------------------------------------------------------------------

/// Optional export settings. Zero / `NULL` fields fall back to defaults:
/// - `title`          → "Resume"
/// - `pixel_ratio`    → 2.0
/// - `sidebar_width`  → no sidebar (content exports only)
#[repr(C)]
pub struct RforgeExportConfig {
    /// Null-terminated UTF-8 document title, or `NULL`.
    pub title: *const c_char,
    /// Capture oversampling factor. `0.0` uses the default.
    pub pixel_ratio: f32,
    /// Width of a full-height left sidebar band in px; `0.0` for none.
    pub sidebar_width: f32,
    /// Sidebar colour as `0xRRGGBB`.
    pub sidebar_color: u32,
}

/// # Safety
/// `cfg.title`, if non-null, must point to a valid null-terminated string.
unsafe fn pipeline_config_from_c(cfg: Option<&RforgeExportConfig>) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    let Some(cfg) = cfg else {
        return config;
    };
    if !cfg.title.is_null() {
        if let Ok(title) = CStr::from_ptr(cfg.title).to_str() {
            config.title = title.to_string();
        }
    }
    if cfg.pixel_ratio > 0.0 && cfg.pixel_ratio.is_finite() {
        config.pixel_ratio = cfg.pixel_ratio;
    }
    config
}

fn sidebar_from_c(cfg: Option<&RforgeExportConfig>) -> Sidebar {
    match cfg {
        Some(cfg) if cfg.sidebar_width > 0.0 => {
            let channel = |shift: u32| ((cfg.sidebar_color >> shift) & 0xff) as f32 / 255.0;
            Sidebar::Band {
                width: cfg.sidebar_width,
                color: Rgba::opaque(channel(16), channel(8), channel(0)),
                position: SidebarPosition::Left,
            }
        }
        _ => Sidebar::None,
    }
}

/// # Safety
/// `data` must point to `len` readable bytes.
unsafe fn read_utf8<'a>(data: *const u8, len: u32) -> Result<&'a str, c_int> {
    let bytes = slice::from_raw_parts(data, len as usize);
    std::str::from_utf8(bytes).map_err(|e| {
        set_last_error(&format!("Invalid UTF-8: {e}"));
        RFORGE_ERR_UTF8
    })
}

/// Length of a buffer as reported through a `u32` out-parameter.
fn buffer_len(len: usize) -> Result<u32, c_int> {
    u32::try_from(len).map_err(|_| {
        set_last_error(&format!("Output of {len} bytes exceeds the 4 GiB buffer limit"));
        RFORGE_ERR_EXPORT
    })
}

/// # Safety
/// `out_buf` and `out_len` must be valid for writes.
unsafe fn hand_over(bytes: Vec<u8>, out_buf: *mut *mut u8, out_len: *mut u32) -> c_int {
    let len = match buffer_len(bytes.len()) {
        Ok(len) => len,
        Err(rc) => return rc,
    };
    let raw = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
    *out_buf = raw;
    *out_len = len;
    RFORGE_OK
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Paginate a content block (JSON) and return the layout report (JSON).
///
/// `geometry` may be null for A4 defaults.
///
/// # Safety
/// - `content_ptr` must point to `content_len` valid bytes.
/// - `out_json` must be a valid pointer; free the result with `rforge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn rforge_compute_pages(
    content_ptr: *const u8,
    content_len: u32,
    geometry: *const PageGeometry,
    out_json: *mut *mut c_char,
) -> c_int {
    if content_ptr.is_null() || out_json.is_null() {
        set_last_error("Null pointer argument");
        return RFORGE_ERR_NULL;
    }
    let json = match read_utf8(content_ptr, content_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let geometry = geometry.as_ref().copied().unwrap_or_default();

    let report = ContentBlock::from_json(json)
        .map_err(Error::from)
        .and_then(|content| layout_report(&content, &geometry));
    match report {
        Ok(report) => match CString::new(report.to_json()) {
            Ok(cs) => {
                *out_json = cs.into_raw();
                RFORGE_OK
            }
            Err(e) => {
                set_last_error(&format!("CString error: {e}"));
                RFORGE_ERR_LAYOUT
            }
        },
        Err(e) => fail(&e),
    }
}

/// Export a content block (JSON) as an image-based PDF.
///
/// # Safety
/// - `content_ptr` must point to `content_len` valid bytes.
/// - `config` may be null; otherwise it must point to a valid config.
/// - `out_buf` / `out_len` must be valid pointers; free the result with
///   `rforge_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn rforge_export_content(
    content_ptr: *const u8,
    content_len: u32,
    config: *const RforgeExportConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if content_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return RFORGE_ERR_NULL;
    }
    let json = match read_utf8(content_ptr, content_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let cfg = config.as_ref();
    let pipeline = pipeline_config_from_c(cfg);

    let result = ContentBlock::from_json(json)
        .map_err(Error::from)
        .and_then(|content| export_content(content, sidebar_from_c(cfg), &pipeline, shared_fonts()));
    match result {
        Ok(artifact) => hand_over(artifact.bytes, out_buf, out_len),
        Err(e) => fail(&e),
    }
}

/// Render a résumé (JSON) with a template and export it as a PDF.
///
/// `template_id` may be null for the default template; unknown ids also
/// fall back to it. The config's sidebar fields are ignored; the template
/// decides the sidebar.
///
/// # Safety
/// Same as `rforge_export_content`; `template_id`, if non-null, must be a
/// valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn rforge_export_resume(
    resume_ptr: *const u8,
    resume_len: u32,
    template_id: *const c_char,
    config: *const RforgeExportConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if resume_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return RFORGE_ERR_NULL;
    }
    let json = match read_utf8(resume_ptr, resume_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let template = if template_id.is_null() {
        ""
    } else {
        CStr::from_ptr(template_id).to_str().unwrap_or("")
    };
    let mut pipeline = pipeline_config_from_c(config.as_ref());

    let result = Resume::from_json(json).map_err(Error::from).and_then(|resume| {
        pipeline.filename = PipelineConfig::filename_for(&resume.header.full_name);
        export_resume(&resume, template, &pipeline, shared_fonts())
    });
    match result {
        Ok(artifact) => hand_over(artifact.bytes, out_buf, out_len),
        Err(e) => fail(&e),
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a buffer returned by `rforge_export_*`.
///
/// # Safety
/// `buf` must have been returned by a previous `rforge_export_*` call, and
/// `len` must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn rforge_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        // u32 -> usize widens on every supported target.
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `rforge_compute_pages`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn rforge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// The last error message on this thread, or null. Valid until the next
/// failing `rforge_*` call on the same thread; do not free it.
#[no_mangle]
pub extern "C" fn rforge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cs) => cs.as_ptr(),
        None => ptr::null(),
    })
}

/// Library version as a static null-terminated string; do not free it.
#[no_mangle]
pub extern "C" fn rforge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
