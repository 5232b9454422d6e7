//! PDF rasterisation via pdfium, one page per pull.
//!
//! ## Binding lifetime
//!
//! `PdfDocument<'a>` borrows the `Pdfium` handle it was loaded from, and a
//! lazy stream has to own its document. The handle is bound once per process
//! into a `static`, so documents borrow it for `'static`. pdfium's `sync`
//! feature serialises calls into the library, which is what makes sharing
//! one binding across blocking-pool threads sound.
//!
//! ## Why cap pixels as well as fixing DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI is roughly 7 000 × 9 900 px.
//! `max_rendered_pixels` caps the longest edge regardless of physical size,
//! keeping a single page's pixel buffer bounded.

use crate::config::RenderOptions;
use crate::error::{PageMergeError, Result};
use crate::pipeline::encode::{encode_png, flatten};
use crate::pipeline::pages::Page;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium handle, binding on first use. A failed bind is
/// not cached, so a later call may succeed once the library is in place.
pub(crate) fn pdfium() -> Result<&'static Pdfium> {
    PDFIUM.get_or_try_init(load_pdfium)
}

/// Load the pdfium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            PageMergeError::PdfiumBindingFailed(format!("{path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded pdfium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| PageMergeError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

fn open_document(path: &Path) -> Result<PdfDocument<'static>> {
    pdfium()?
        .load_pdf_from_file(path, None)
        .map_err(|e| PageMergeError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

/// Number of pages in the PDF's page tree. Nothing is rendered.
pub(crate) fn pdf_page_count(path: &Path) -> Result<usize> {
    let document = open_document(path)?;
    Ok(document.pages().len() as usize)
}

/// Pixel size for a page at `dpi`, with the longest edge capped at
/// `max_px` and the aspect ratio preserved. Both sides are at least 1.
pub(crate) fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_px: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest > max_px as f32 {
        let ratio = max_px as f32 / longest;
        let w = ((raw_w * ratio) as u32).clamp(1, max_px);
        let h = ((raw_h * ratio) as u32).clamp(1, max_px);
        (w, h)
    } else {
        (raw_w.round() as u32, raw_h.round() as u32)
    }
}

/// An open PDF yielding rendered pages in order.
pub(crate) struct PdfSource {
    document: PdfDocument<'static>,
    path: PathBuf,
    total: usize,
    next: usize,
    options: RenderOptions,
}

impl PdfSource {
    pub(crate) fn open(path: &Path, options: RenderOptions) -> Result<Self> {
        let document = open_document(path)?;
        let total = document.pages().len() as usize;
        info!(path = %path.display(), pages = total, dpi = options.dpi, "PDF loaded");
        Ok(Self {
            document,
            path: path.to_path_buf(),
            total,
            next: 0,
            options,
        })
    }

    pub(crate) fn remaining(&self) -> usize {
        self.total - self.next
    }

    pub(crate) fn next_page(&mut self) -> Option<Result<Page>> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.render(index))
    }

    fn render(&self, index: usize) -> Result<Page> {
        let page_num = index + 1;
        let raster_err = |detail: String| PageMergeError::RasterisationFailed {
            page: page_num,
            detail,
        };

        let page_index = u16::try_from(index)
            .map_err(|_| raster_err(format!("page index {index} exceeds pdfium's u16 range")))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| raster_err(format!("{e:?}")))?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(
            width_points,
            height_points,
            self.options.dpi,
            self.options.max_rendered_pixels,
        );
        let longest_uncapped =
            (width_points.max(height_points) * self.options.dpi as f32 / POINTS_PER_INCH) as u32;
        if longest_uncapped > self.options.max_rendered_pixels {
            warn!(
                path = %self.path.display(),
                page = page_num,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {}px",
                self.options.max_rendered_pixels
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| raster_err(format!("{e:?}")))?;

        let image = flatten(bitmap.as_image());
        debug!(
            page = page_num,
            width = image.width(),
            height = image.height(),
            "Rendered PDF page"
        );

        let png = encode_png(&image, page_num)?;
        Ok(Page { index, png })
    }
}
