//! Type detection: classify a document's container from content and name.
//!
//! The first bytes of the file decide. The extension is consulted only when
//! no signature matches, so a PDF saved as `scan.png` is still a PDF. TIFF
//! and WebP files written by some scanners carry damaged headers, which is
//! why the extension fallback exists at all.

use crate::error::{PageMergeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_SIGNATURE: &[u8] = b"%PDF";
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8];
const TIFF_LE_SIGNATURE: &[u8] = &[0x49, 0x49, 0x2A, 0x00];
const TIFF_BE_SIGNATURE: &[u8] = &[0x4D, 0x4D, 0x00, 0x2A];
const RIFF_SIGNATURE: &[u8] = b"RIFF";
const WEBP_FOURCC: &[u8] = b"WEBP";

/// Bytes needed to see every signature (RIFF size + `WEBP` ends at 12).
const MAGIC_LEN: usize = 12;

const PDF_EXTENSIONS: &[&str] = &["pdf"];
const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Container format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Multi-page PDF, rasterised page by page.
    Pdf,
    /// Multi-frame TIFF, one page per IFD.
    Tiff,
    /// Any single-frame raster image (PNG, JPEG, WebP, BMP, GIF).
    Image,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Tiff => "tiff",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified document: canonical path plus container type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub doc_type: DocumentType,
}

impl Document {
    /// Resolve `path` to an absolute path and classify it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let resolved =
            std::fs::canonicalize(path).map_err(|e| PageMergeError::from_io(path, e))?;
        let doc_type = classify(&resolved)?;
        Ok(Self {
            path: resolved,
            doc_type,
        })
    }
}

/// Classify the document at `path`.
///
/// # Errors
/// - [`PageMergeError::NotFound`] if the path does not exist
/// - [`PageMergeError::UnsupportedType`] if neither signature nor extension match
pub fn classify(path: impl AsRef<Path>) -> Result<DocumentType> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PageMergeError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let magic = read_magic(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let doc_type = detect_signature(&magic, extension.as_deref()).ok_or_else(|| {
        PageMergeError::UnsupportedType {
            path: path.to_path_buf(),
        }
    })?;

    debug!(path = %path.display(), doc_type = %doc_type, "Classified document");
    Ok(doc_type)
}

/// Pure classification from a content prefix and a lowercase extension.
///
/// Signatures are checked first; the extension is used only when no
/// signature matches.
pub fn detect_signature(magic: &[u8], extension: Option<&str>) -> Option<DocumentType> {
    if magic.starts_with(PDF_SIGNATURE) {
        return Some(DocumentType::Pdf);
    }
    if magic.starts_with(TIFF_LE_SIGNATURE) || magic.starts_with(TIFF_BE_SIGNATURE) {
        return Some(DocumentType::Tiff);
    }
    if magic.starts_with(PNG_SIGNATURE)
        || magic.starts_with(JPEG_SIGNATURE)
        || is_webp(magic)
    {
        return Some(DocumentType::Image);
    }

    let ext = extension?;
    if PDF_EXTENSIONS.contains(&ext) {
        Some(DocumentType::Pdf)
    } else if TIFF_EXTENSIONS.contains(&ext) {
        Some(DocumentType::Tiff)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(DocumentType::Image)
    } else {
        None
    }
}

/// True when `magic` starts with the PNG signature.
pub(crate) fn is_png(magic: &[u8]) -> bool {
    magic.starts_with(PNG_SIGNATURE)
}

fn is_webp(magic: &[u8]) -> bool {
    magic.starts_with(RIFF_SIGNATURE) && magic.get(8..12) == Some(WEBP_FOURCC)
}

/// Read up to [`MAGIC_LEN`] bytes; shorter files return what they have.
pub(crate) fn read_magic(path: &Path) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path).map_err(|e| PageMergeError::from_io(path, e))?;
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    file.take(MAGIC_LEN as u64)
        .read_to_end(&mut magic)
        .map_err(|e| PageMergeError::from_io(path, e))?;
    Ok(magic)
}
