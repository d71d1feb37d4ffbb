//! Input loading: read a drawing from disk and classify its bytes.
//!
//! The kind is decided from magic bytes, never from the file extension.
//! Scans exported from document-management systems often carry a `.pdf`
//! name on a JPEG body (and the reverse).

use crate::error::ExtractError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A drawing loaded into memory.
#[derive(Debug, Clone)]
pub struct DrawingInput {
    /// Display name used in status messages and the report.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DrawingInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn kind(&self) -> Result<InputKind, ExtractError> {
        detect_kind(&self.name, &self.bytes)
    }
}

/// What the normalizer has to do with an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Rasterise the first page.
    Pdf,
    /// Already a raster image in the given format.
    Raster(ImageFormat),
}

impl InputKind {
    pub fn is_pdf(self) -> bool {
        matches!(self, InputKind::Pdf)
    }
}

/// Classify `bytes` as a PDF or a supported raster image.
pub fn detect_kind(name: &str, bytes: &[u8]) -> Result<InputKind, ExtractError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(InputKind::Pdf);
    }
    match image::guess_format(bytes) {
        Ok(fmt @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(InputKind::Raster(fmt)),
        _ => Err(ExtractError::UnsupportedInput {
            name: name.to_string(),
            magic: bytes.iter().take(8).copied().collect(),
        }),
    }
}

/// Read a drawing from a local path.
///
/// The display name is the file name component of `path`.
pub async fn load_path(path: &Path) -> Result<DrawingInput, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Internal(format!("Failed to read '{}': {e}", path.display())),
    })?;

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(DrawingInput::new(display_name(path), bytes))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn detects_pdf_by_magic() {
        assert_eq!(detect_kind("x.png", b"%PDF-1.7\n").unwrap(), InputKind::Pdf);
    }

    #[test]
    fn detects_png_regardless_of_name() {
        let kind = detect_kind("scan.pdf", &png_bytes()).unwrap();
        assert_eq!(kind, InputKind::Raster(ImageFormat::Png));
        assert!(!kind.is_pdf());
    }

    #[test]
    fn rejects_unknown_bytes() {
        let err = detect_kind("notes.txt", b"hello world").unwrap_err();
        match err {
            ExtractError::UnsupportedInput { name, magic } => {
                assert_eq!(name, "notes.txt");
                assert_eq!(magic, b"hello wo".to_vec());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = load_path(Path::new("/nonexistent/drawing.pdf")).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cyl-100.png");
        std::fs::write(&path, png_bytes()).unwrap();
        let input = load_path(&path).await.unwrap();
        assert_eq!(input.name, "cyl-100.png");
        assert_eq!(input.kind().unwrap(), InputKind::Raster(ImageFormat::Png));
    }
}
