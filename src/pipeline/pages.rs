//! Page stream: a lazy, ordered sequence of PNG pages for any document.
//!
//! [`PageStream`] owns the open container (pdfium document, TIFF decoder and
//! its file handle) and produces one page per `next()` call. Nothing is
//! rendered ahead of the consumer, so at most one decoded frame and one
//! encoded PNG exist at a time. The container is released as soon as the
//! stream is exhausted, fails, reaches its cap, or is dropped.
//!
//! ```text
//! Document ──▶ PageSource::{Pdf, Tiff, Image} ──▶ Page { index, png }
//!                (chosen once at open time)        0, 1, 2, … no gaps
//! ```

use crate::config::RenderOptions;
use crate::error::{PageMergeError, Result};
use crate::pipeline::detect::{self, Document, DocumentType};
use crate::pipeline::encode::{encode_png, flatten};
use crate::pipeline::frames::TiffSource;
use crate::pipeline::input::SpooledDocument;
use crate::pipeline::render::PdfSource;
use std::fmt;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One normalised page: zero-based index and PNG bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub png: Vec<u8>,
}

impl Page {
    /// 1-based page number for labels and log lines.
    pub fn page_number(&self) -> usize {
        self.index + 1
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("png_len", &self.png.len())
            .finish()
    }
}

/// Open a lazy page stream over the document at `path` with default
/// rendering (150 DPI).
///
/// Classification happens here, so `NotFound` and `UnsupportedType` surface
/// before any page is pulled. `max_pages` caps the number of pages yielded;
/// `Some(0)` yields nothing.
pub fn pages(path: impl AsRef<Path>, max_pages: Option<usize>) -> Result<PageStream> {
    pages_with(path, max_pages, &RenderOptions::default())
}

/// Like [`pages`] with explicit PDF rendering options.
pub fn pages_with(
    path: impl AsRef<Path>,
    max_pages: Option<usize>,
    options: &RenderOptions,
) -> Result<PageStream> {
    let document = Document::open(path)?;
    PageStream::open(document, max_pages, options)
}

/// Per-format page producer, selected once when the stream opens.
enum PageSource {
    Pdf(PdfSource),
    Tiff(TiffSource),
    Image(ImageSource),
    /// Exhausted, failed, capped, or never opened.
    Empty,
}

/// Lazy iterator of `Result<Page>`; see the module docs.
///
/// The iterator is fused: after an error or the last page it keeps
/// returning `None`. Call [`pages`] again to restart from page 0.
pub struct PageStream {
    document: Document,
    source: PageSource,
    limit: Option<usize>,
    emitted: usize,
    // Declared after `source` so the container closes before the spool file
    // is deleted.
    _spool: Option<SpooledDocument>,
}

impl PageStream {
    pub(crate) fn open(
        document: Document,
        max_pages: Option<usize>,
        options: &RenderOptions,
    ) -> Result<Self> {
        let source = match document.doc_type {
            DocumentType::Pdf => PageSource::Pdf(PdfSource::open(&document.path, *options)?),
            DocumentType::Tiff => PageSource::Tiff(TiffSource::open(&document.path)?),
            DocumentType::Image if max_pages == Some(0) => PageSource::Empty,
            DocumentType::Image => PageSource::Image(ImageSource::new(document.path.clone())),
        };

        info!(
            path = %document.path.display(),
            doc_type = %document.doc_type,
            max_pages = ?max_pages,
            "Opened page stream"
        );

        Ok(Self {
            document,
            source,
            limit: max_pages,
            emitted: 0,
            _spool: None,
        })
    }

    /// Keep a spooled temp file alive for as long as the stream.
    pub(crate) fn with_spool(mut self, spool: SpooledDocument) -> Self {
        self._spool = Some(spool);
        self
    }

    /// The classified document this stream reads.
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn doc_type(&self) -> DocumentType {
        self.document.doc_type
    }

    /// Number of pages yielded so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Release the underlying container now. Equivalent to dropping the stream.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !matches!(self.source, PageSource::Empty) {
            self.source = PageSource::Empty;
            debug!(
                path = %self.document.path.display(),
                emitted = self.emitted,
                "Released page source"
            );
        }
    }

    fn remaining_cap(&self) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(self.emitted))
    }
}

impl Iterator for PageStream {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_cap() == Some(0) {
            self.release();
            return None;
        }

        let next = match &mut self.source {
            PageSource::Pdf(source) => source.next_page(),
            PageSource::Tiff(source) => source.next_frame(),
            PageSource::Image(source) => source.next_page(),
            PageSource::Empty => None,
        };

        match next {
            Some(Ok(page)) => {
                debug_assert_eq!(page.index, self.emitted, "pages must be contiguous");
                self.emitted += 1;
                Some(Ok(page))
            }
            Some(Err(e)) => {
                self.release();
                Some(Err(e))
            }
            None => {
                self.release();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let available = match &self.source {
            PageSource::Pdf(source) => Some(source.remaining()),
            PageSource::Image(source) => Some(source.remaining()),
            PageSource::Tiff(_) => None,
            PageSource::Empty => Some(0),
        };
        let upper = match (available, self.remaining_cap()) {
            (Some(a), Some(c)) => Some(a.min(c)),
            (Some(a), None) => Some(a),
            (None, c) => c,
        };
        (0, upper)
    }
}

impl FusedIterator for PageStream {}

impl fmt::Debug for PageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageStream")
            .field("document", &self.document)
            .field("limit", &self.limit)
            .field("emitted", &self.emitted)
            .field("open", &!matches!(self.source, PageSource::Empty))
            .finish()
    }
}

// ── Single image source ──────────────────────────────────────────────────

/// Exactly one page. The file is read only when the page is pulled.
struct ImageSource {
    path: PathBuf,
    taken: bool,
}

impl ImageSource {
    fn new(path: PathBuf) -> Self {
        Self { path, taken: false }
    }

    fn remaining(&self) -> usize {
        usize::from(!self.taken)
    }

    fn next_page(&mut self) -> Option<Result<Page>> {
        if self.taken {
            return None;
        }
        self.taken = true;
        Some(self.load())
    }

    fn load(&self) -> Result<Page> {
        let bytes = std::fs::read(&self.path).map_err(|e| PageMergeError::from_io(&self.path, e))?;

        if detect::is_png(&bytes) {
            debug!(path = %self.path.display(), "PNG passthrough");
            return Ok(Page { index: 0, png: bytes });
        }

        let img = image::load_from_memory(&bytes).map_err(|e| PageMergeError::ImageDecodeFailed {
            page: 1,
            detail: e.to_string(),
        })?;
        // The compressed source is no longer needed once decoded.
        drop(bytes);

        let png = encode_png(&flatten(img), 1)?;
        Ok(Page { index: 0, png })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn write_image(dir: &tempfile::TempDir, name: &str, format: image::ImageFormat) -> PathBuf {
        let path = dir.path().join(name);
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([200, 10, 10, 128])));
        let img = if format == image::ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };
        img.save_with_format(&path, format).unwrap();
        path
    }

    #[test]
    fn png_passes_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(&dir, "a.png", image::ImageFormat::Png);
        let original = std::fs::read(&path).unwrap();

        let pages: Vec<Page> = pages(&path, None).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 0);
        assert_eq!(pages[0].png, original);
    }

    #[test]
    fn jpeg_is_reencoded_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(&dir, "a.jpg", image::ImageFormat::Jpeg);

        let pages: Vec<Page> = pages(&path, None).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(&pages[0].png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&pages[0].png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn bmp_with_alpha_is_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(&dir, "a.bmp", image::ImageFormat::Bmp);

        let page = pages(&path, None).unwrap().next().unwrap().unwrap();
        let decoded = image::load_from_memory(&page.png).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn image_cap_zero_yields_nothing_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        // Undecodable body: a read would fail, a skipped read succeeds.
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0x00, 0x00]).unwrap();

        let mut stream = pages(&path, Some(0)).unwrap();
        assert!(stream.next().is_none());
        assert_eq!(stream.emitted(), 0);
    }

    #[test]
    fn image_cap_above_one_still_yields_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(&dir, "a.png", image::ImageFormat::Png);
        assert_eq!(pages(&path, Some(5)).unwrap().count(), 1);
    }

    #[test]
    fn undecodable_image_fails_then_fuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0x00, 0x00]).unwrap();

        let mut stream = pages(&path, None).unwrap();
        assert!(matches!(
            stream.next(),
            Some(Err(PageMergeError::ImageDecodeFailed { page: 1, .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = pages("/nope/missing.pdf", None).unwrap_err();
        assert!(matches!(err, PageMergeError::NotFound { .. }));
    }

    #[test]
    fn size_hint_for_single_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(&dir, "a.png", image::ImageFormat::Png);
        let stream = pages(&path, None).unwrap();
        assert_eq!(stream.size_hint(), (0, Some(1)));
    }

    #[test]
    fn page_debug_hides_bytes() {
        let page = Page {
            index: 2,
            png: vec![0; 1024],
        };
        let dbg = format!("{page:?}");
        assert!(dbg.contains("png_len: 1024"));
        assert_eq!(page.page_number(), 3);
    }
}
