//! Page counting without rendering or decoding pixels.

use crate::error::Result;
use crate::pipeline::detect::{Document, DocumentType};
use crate::pipeline::frames::tiff_frame_count;
use crate::pipeline::render::pdf_page_count;
use std::path::Path;
use tracing::debug;

/// Number of pages [`pages`](crate::pipeline::pages::pages) would yield with
/// no cap.
///
/// PDF: entries in the page tree. TIFF: frames in the IFD chain. Image: 1.
pub fn page_count(path: impl AsRef<Path>) -> Result<usize> {
    count_document(&Document::open(path)?)
}

pub(crate) fn count_document(document: &Document) -> Result<usize> {
    let count = match document.doc_type {
        DocumentType::Pdf => pdf_page_count(&document.path)?,
        DocumentType::Tiff => tiff_frame_count(&document.path)?,
        DocumentType::Image => 1,
    };
    debug!(path = %document.path.display(), doc_type = %document.doc_type, count, "Counted pages");
    Ok(count)
}
