//! In-memory input: spool document bytes to a temp file.
//!
//! pdfium and the TIFF decoder both want a file-system path, and
//! classification needs the file name for its extension fallback. Bytes are
//! written into a `TempDir` under the caller's file name, so cleanup happens
//! automatically when the `SpooledDocument` is dropped, even on panic.

use crate::error::{PageMergeError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

const DEFAULT_SPOOL_NAME: &str = "document";

/// Document bytes written to a temporary directory.
pub struct SpooledDocument {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl SpooledDocument {
    /// Write `bytes` to a fresh temp directory.
    ///
    /// `name_hint` is an original file name such as `"scan.tif"`; only its
    /// final component is used. Without a hint the file has no extension and
    /// classification relies on content alone.
    pub fn write(bytes: &[u8], name_hint: Option<&str>) -> Result<Self> {
        let temp_dir = TempDir::new()
            .map_err(|e| PageMergeError::Internal(format!("Failed to create temp dir: {e}")))?;
        let path = temp_dir.path().join(spool_file_name(name_hint));

        std::fs::write(&path, bytes).map_err(|e| PageMergeError::Io {
            path: path.clone(),
            source: e,
        })?;

        debug!(path = %path.display(), size = bytes.len(), "Spooled document bytes");
        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Final path component of the hint, rejecting anything that would escape
/// the temp directory.
fn spool_file_name(name_hint: Option<&str>) -> String {
    name_hint
        .and_then(|hint| Path::new(hint).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(DEFAULT_SPOOL_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_keeps_extension_from_hint() {
        let spool = SpooledDocument::write(b"%PDF-1.4", Some("uploads/scan.PDF")).unwrap();
        assert_eq!(spool.path().file_name().unwrap(), "scan.PDF");
        assert_eq!(std::fs::read(spool.path()).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn spool_without_hint_has_no_extension() {
        let spool = SpooledDocument::write(b"abc", None).unwrap();
        assert!(spool.path().extension().is_none());
    }

    #[test]
    fn traversal_hint_is_neutralised() {
        assert_eq!(spool_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(spool_file_name(Some("..")), DEFAULT_SPOOL_NAME);
        assert_eq!(spool_file_name(Some("")), DEFAULT_SPOOL_NAME);
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let spool = SpooledDocument::write(b"x", Some("a.png")).unwrap();
        let path = spool.path().to_path_buf();
        assert!(path.exists());
        drop(spool);
        assert!(!path.exists());
    }
}
