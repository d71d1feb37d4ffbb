//! Error types for the drawspec library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **fatal for one file**; the drawing cannot be turned
//!   into a parameter table (corrupt PDF, upload refused, extraction oracle
//!   returned garbage). The orchestrator converts it into exactly one
//!   [`crate::events::PipelineEvent::Failed`] and moves on to the next file.
//!
//! * [`OracleError`]: a single call to an external vision model failed.
//!   Whether that is fatal depends on the stage: orientation swallows it and
//!   falls back to 0°, extraction and validation wrap it in
//!   [`ExtractError::Oracle`].
//!
//! Nothing here is fatal for a whole multi-file run: even a missing hosting
//! key fails each file independently.

use std::path::PathBuf;
use thiserror::Error;

/// All errors that abort the processing of a single drawing.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Drawing not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The bytes are neither a PDF nor a decodable raster image.
    #[error("Unsupported input '{name}': not a PDF, PNG or JPEG (first bytes: {magic:?})")]
    UnsupportedInput { name: String, magic: Vec<u8> },

    // ── Normalisation errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Failed to convert PDF to image: {detail}")]
    CorruptPdf { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The raster image could not be decoded or re-encoded.
    #[error("Image processing failed: {0}")]
    ImageDecode(String),

    // ── Hosting errors ────────────────────────────────────────────────────
    /// The image-hosting credential is not configured.
    #[error("Failed to upload image to hosting service: IMGBB_API_KEY is not set. Cannot proceed.")]
    UploadKeyMissing,

    /// The hosting service refused or failed the upload.
    #[error("Failed to upload image to hosting service: {reason}. Cannot proceed.")]
    UploadFailed { reason: String },

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// An extraction or validation oracle call failed.
    #[error("{stage} failed for {batch}: {source}")]
    Oracle {
        stage: &'static str,
        batch: String,
        #[source]
        source: OracleError,
    },

    /// The oracle answered but its content violates the output contract.
    #[error("Oracle response for {batch} violates the output contract: {detail}")]
    MalformedResponse { batch: String, detail: String },

    // ── Config / output errors ────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not write the batch report.
    #[error("Failed to write report '{path}': {detail}")]
    ReportWriteFailed { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("An unexpected error occurred in the backend: {0}")]
    Internal(String),
}

/// A failed call to an external vision model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    /// No credential was configured for the oracle endpoint.
    #[error("oracle API key is not set")]
    MissingApiKey,

    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The call exceeded its timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or body-transfer failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response envelope could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response carried no message content.
    #[error("response contained no message content")]
    EmptyContent,
}

impl OracleError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Http { status, .. } => *status == 429 || *status >= 500,
            OracleError::Timeout { .. } | OracleError::Transport(_) => true,
            OracleError::MissingApiKey
            | OracleError::MalformedResponse(_)
            | OracleError::EmptyContent => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_key_missing_display() {
        let msg = ExtractError::UploadKeyMissing.to_string();
        assert!(msg.contains("IMGBB_API_KEY"), "got: {msg}");
        assert!(msg.contains("Cannot proceed"));
    }

    #[test]
    fn oracle_error_display_names_stage_and_batch() {
        let e = ExtractError::Oracle {
            stage: "Extraction",
            batch: "batch1".into(),
            source: OracleError::Http {
                status: 400,
                body: "bad request".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("Extraction"));
        assert!(msg.contains("batch1"));
        assert!(msg.contains("400"));
    }

    #[test]
    fn transient_classification() {
        assert!(OracleError::Http { status: 429, body: String::new() }.is_transient());
        assert!(OracleError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!OracleError::Http { status: 401, body: String::new() }.is_transient());
        assert!(OracleError::Timeout { secs: 30 }.is_transient());
        assert!(!OracleError::MissingApiKey.is_transient());
        assert!(!OracleError::EmptyContent.is_transient());
    }

    #[test]
    fn corrupt_pdf_display() {
        let e = ExtractError::CorruptPdf {
            detail: "xref broken".into(),
        };
        assert!(e.to_string().starts_with("Failed to convert PDF to image"));
    }
}
