//! PDF rasterisation: render the first page of a drawing via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and is CPU-bound while rendering. Rendering runs on the
//! blocking pool so the Tokio workers keep serving oracle calls for other
//! files.
//!
//! Only page one is rendered. Multi-sheet drawings are out of scope; every
//! later page is discarded.

use crate::error::ExtractError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Turns PDF bytes into a raster image of the first page.
///
/// Injected into the orchestrator so tests can run without a pdfium binary.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn first_page(&self, pdf: Vec<u8>, scale: f32) -> Result<DynamicImage, ExtractError>;
}

/// [`PageRasterizer`] backed by a dynamically loaded pdfium library.
///
/// Library lookup order: `PDFIUM_DYNAMIC_LIB_PATH`, the executable's
/// directory, then the system library path.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRasterizer;

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn first_page(&self, pdf: Vec<u8>, scale: f32) -> Result<DynamicImage, ExtractError> {
        tokio::task::spawn_blocking(move || render_first_page_blocking(&pdf, scale))
            .await
            .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn render_first_page_blocking(pdf: &[u8], scale: f32) -> Result<DynamicImage, ExtractError> {
    let pdfium = load_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| ExtractError::CorruptPdf {
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(ExtractError::CorruptPdf {
            detail: "document has no pages".into(),
        });
    }
    info!("PDF loaded: {} pages, rendering page 1", total_pages);

    let page = pages.get(0).map_err(|e| ExtractError::CorruptPdf {
        detail: format!("{:?}", e),
    })?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractError::CorruptPdf {
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    Ok(image)
}

fn load_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %dir.display(), "Loaded pdfium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}
