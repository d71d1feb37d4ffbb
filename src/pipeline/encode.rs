//! Image encoding for the oracle request body and event serialisation.
//!
//! The orientation oracle receives the image inline as a base64 data URI;
//! extraction and validation reference the hosted URL instead, so the
//! (large) image is uploaded once rather than re-sent per batch.

use crate::pipeline::normalize::ProcessedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serializer;
use tracing::debug;

/// Encode an image as a `data:` URI for an inline `image_url` part.
pub fn data_uri(image: &ProcessedImage) -> String {
    let b64 = STANDARD.encode(&image.bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    format!("data:{};base64,{}", image.mime_type(), b64)
}

/// Serde helper: write raw bytes as a base64 string.
pub fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}
