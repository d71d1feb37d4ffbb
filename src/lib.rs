//! # drawspec
//!
//! Extract structured parameters from scanned hydraulic and pneumatic
//! cylinder drawings using vision language models.
//!
//! ## Why this crate?
//!
//! Legacy cylinder drawings live as scanned PDFs and images, often rotated,
//! with the specification scattered across a title block, callouts and
//! notes. This crate straightens each drawing, hosts it once, and asks a
//! reasoning model for a fixed parameter schema in small batches, producing
//! a machine-readable table per drawing and a pivoted report per run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! drawing (PDF / PNG / JPEG)
//!  │
//!  ├─ 1. Prepare     sniff the input kind
//!  ├─ 2. Convert     rasterise page one via pdfium (spawn_blocking), JPEG q95
//!  ├─ 3. Orient      vision oracle picks 0/90/180/270° CCW (falls back to 0°)
//!  ├─ 4. Rotate      CCW rotation with canvas expansion
//!  ├─ 5. Upscale     optional, through a scratch file
//!  ├─ 6. Upload      image host returns a public URL
//!  ├─ 7. Extract     one schema-constrained oracle call per batch (6 + 7 keys)
//!  ├─ 8. Validate    optional correction pass per batch
//!  └─ 9. Finalize    merged mapping + final image
//! ```
//!
//! Every step is reported as a [`PipelineEvent`]; each file ends with
//! exactly one `Failed` or `Completed` event, and a failed file never stops
//! a multi-file run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drawspec::{DrawingInput, ExtractionConfig, Extractor, PipelineEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .image_host_key(std::env::var("IMGBB_API_KEY")?)
//!         .build()?;
//!     let extractor = Extractor::new(config)?;
//!
//!     let input = DrawingInput::new("cyl-100.pdf", std::fs::read("cyl-100.pdf")?);
//!     let result = extractor
//!         .process_file(&input, &mut |event| {
//!             if let PipelineEvent::Status { message, progress, .. } = event {
//!                 eprintln!("[{:>3.0}%] {}", progress * 100.0, message);
//!             }
//!         })
//!         .await;
//!
//!     match result {
//!         Ok(outcome) => {
//!             for (key, value) in outcome.data.iter() {
//!                 println!("{key}: {value}");
//!             }
//!         }
//!         Err(message) => eprintln!("{message}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `drawspec` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! drawspec = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod events;
pub mod oracle;
pub mod orchestrator;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, MissingKeyPolicy};
pub use error::{ExtractError, OracleError};
pub use events::{FileOutcome, FileRecord, ParameterValues, PipelineEvent, Stage};
pub use oracle::{ImageRef, OpenAiOracle, OracleRequest, VisionOracle};
pub use orchestrator::{extract_paths, Extractor};
pub use partition::{partition, BatchStrategy, FeatureBatch};
pub use pipeline::input::DrawingInput;
pub use pipeline::normalize::{ProcessedImage, Rotation};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use pipeline::upload::{ImageHost, ImgbbHost};
pub use pipeline::upscale::{HttpUpscaler, Upscaler};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::ReportTable;
pub use schema::{ParameterSchema, NA};
pub use stream::{extract_files_stream, extract_stream, RunEvent};
