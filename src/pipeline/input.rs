//! Input validation: make sure the source is a readable local PDF before any
//! pipeline state (progress file, output directory, service) is touched.

use crate::error::PdfOcrError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Check that `path` exists, has a `.pdf` extension (any case), can be opened,
/// and starts with the `%PDF` magic bytes.
pub fn validate_pdf(path: impl AsRef<Path>) -> Result<PathBuf, PdfOcrError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(PdfOcrError::FileNotFound { path });
    }
    if !has_pdf_extension(&path) {
        return Err(PdfOcrError::NotPdfExtension { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(PdfOcrError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfOcrError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(PdfOcrError::FileNotFound { path });
        }
    }

    debug!("Validated input PDF: {}", path.display());
    Ok(path)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// File name of the document, e.g. `report.pdf`.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File stem of the document, e.g. `report`. Names the markdown file and
/// prefixes every crop file.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
