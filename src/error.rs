//! Error types for the edgequake-pagemerge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PageMergeError`] — **Fatal**: the document-level operation cannot
//!   proceed (missing file, unsupported container, analyzer failure on a
//!   page). Returned as `Err(PageMergeError)` from every public entry point;
//!   no partial result is ever exposed.
//!
//! * [`PageError`] — **Non-fatal**: one page produced structured output that
//!   could not be used. The page's contribution is dropped, a warning is
//!   logged and the error is recorded on [`crate::output::MergedResult`].

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PageMergeError>;

/// Container formats accepted by the type detector, in the order they are
/// named to users.
pub const SUPPORTED_TYPES: &str = "PDF, TIFF, PNG, JPEG, WebP";

/// All fatal errors returned by the edgequake-pagemerge library.
#[derive(Debug, Error)]
pub enum PageMergeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Neither the content signature nor the extension matched a known format.
    #[error("Unsupported document type: '{path}'. Supported: {}.", SUPPORTED_TYPES)]
    UnsupportedType { path: PathBuf },

    /// The container was recognised but holds no page where one is required.
    #[error("No pages found in '{path}': {detail}")]
    EmptyDocument { path: PathBuf, detail: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt or the file is encrypted.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page (1-based page number).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A TIFF frame or single image could not be decoded.
    #[error("Image decoding failed for page {page}: {detail}")]
    ImageDecodeFailed { page: usize, detail: String },

    /// Re-encoding a decoded page to PNG failed.
    #[error("PNG encoding failed for page {page}: {detail}")]
    EncodeFailed { page: usize, detail: String },

    // ── Analysis errors ───────────────────────────────────────────────────
    /// The analyzer collaborator failed on a page; the whole operation aborts.
    #[error("Analysis failed on page {page}: {detail}")]
    AnalysisFailure { page: usize, detail: String },

    /// The answer combiner was given no page answers.
    #[error("No page answers to combine: the document had no analyzable pages")]
    NoAnswerPages,

    /// No vision provider could be built for [`crate::pipeline::llm::VlmAnalyzer`].
    #[error("Provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium, place the library next to\n\
the executable, or install it in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PageMergeError {
    /// Map an I/O error on `path` to the most specific variant.
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => PageMergeError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => PageMergeError::PermissionDenied { path },
            _ => PageMergeError::Io { path, source },
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::output::MergedResult::page_errors`]. Processing of the
/// remaining pages continues.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The analyzer returned structured output that is not a JSON object.
    #[error("Page {page}: malformed structured output: {detail}")]
    MalformedPageOutput { page: usize, detail: String },
}
