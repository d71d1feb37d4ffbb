//! Image normalisation: PDF → raster, alpha flattening, and rotation.
//!
//! Rotation angles are counter-clockwise and the canvas expands to fit, so
//! a 90° or 270° turn swaps width and height and no corner is cropped.
//! The `image` crate's `rotateN` helpers turn clockwise; [`Rotation::apply`]
//! maps between the two conventions.

use crate::error::ExtractError;
use crate::pipeline::input::{DrawingInput, InputKind};
use crate::pipeline::render::PageRasterizer;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, warn};

/// A counter-clockwise quarter-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Ccw90,
    Ccw180,
    Ccw270,
}

impl Rotation {
    /// Map an angle in degrees to a rotation; anything outside {0, 90, 180, 270} is `None`.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Ccw90),
            180 => Some(Rotation::Ccw180),
            270 => Some(Rotation::Ccw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Ccw90 => 90,
            Rotation::Ccw180 => 180,
            Rotation::Ccw270 => 270,
        }
    }

    pub fn is_identity(self) -> bool {
        self == Rotation::None
    }

    /// Rotate `img` counter-clockwise with canvas expansion.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => img,
            Rotation::Ccw90 => img.rotate270(),
            Rotation::Ccw180 => img.rotate180(),
            Rotation::Ccw270 => img.rotate90(),
        }
    }
}

/// Encoded image bytes plus their format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ProcessedImage {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self { bytes, format }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    /// File extension used when the image is uploaded or saved.
    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "png",
            _ => "jpg",
        }
    }

    pub fn decode(&self) -> Result<DynamicImage, ExtractError> {
        image::load_from_memory_with_format(&self.bytes, self.format)
            .map_err(|e| ExtractError::ImageDecode(e.to_string()))
    }
}

/// Produce the initial raster for a drawing.
///
/// PDFs are rasterised (first page, `scale`) and re-encoded as JPEG; PNG and
/// JPEG inputs pass through untouched.
pub async fn rasterize(
    input: &DrawingInput,
    kind: InputKind,
    rasterizer: &dyn PageRasterizer,
    scale: f32,
    jpeg_quality: u8,
) -> Result<ProcessedImage, ExtractError> {
    match kind {
        InputKind::Pdf => {
            let page = rasterizer.first_page(input.bytes.clone(), scale).await?;
            let bytes = encode_jpeg(&page, jpeg_quality)?;
            debug!("{}: rasterised first page to {} JPEG bytes", input.name, bytes.len());
            Ok(ProcessedImage::new(bytes, ImageFormat::Jpeg))
        }
        InputKind::Raster(format) => Ok(ProcessedImage::new(input.bytes.clone(), format)),
    }
}

/// Flatten any alpha channel and encode as JPEG.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ExtractError> {
    let rgb = if img.color().has_alpha() || !matches!(img, DynamicImage::ImageRgb8(_)) {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img.clone()
    };
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ExtractError::ImageDecode(e.to_string()))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ExtractError::ImageDecode(e.to_string()))?;
    Ok(buf)
}

/// Rotate `image` counter-clockwise, preserving PNG and re-encoding anything else as JPEG.
///
/// Never fails: if decoding, rotating or encoding goes wrong the input is
/// returned unchanged and a warning is logged.
pub fn rotate(image: ProcessedImage, rotation: Rotation, jpeg_quality: u8) -> ProcessedImage {
    if rotation.is_identity() {
        return image;
    }
    match try_rotate(&image, rotation, jpeg_quality) {
        Ok(rotated) => rotated,
        Err(e) => {
            warn!(
                "Rotation by {}° failed, keeping original image: {}",
                rotation.degrees(),
                e
            );
            image
        }
    }
}

fn try_rotate(
    image: &ProcessedImage,
    rotation: Rotation,
    jpeg_quality: u8,
) -> Result<ProcessedImage, ExtractError> {
    let rotated = rotation.apply(image.decode()?);
    debug!(
        "Rotated {}° CCW → {}x{} px",
        rotation.degrees(),
        rotated.width(),
        rotated.height()
    );
    match image.format {
        ImageFormat::Png => Ok(ProcessedImage::new(encode_png(&rotated)?, ImageFormat::Png)),
        _ => Ok(ProcessedImage::new(
            encode_jpeg(&rotated, jpeg_quality)?,
            ImageFormat::Jpeg,
        )),
    }
}
