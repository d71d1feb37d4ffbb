//! Pipeline stages for drawing parameter extraction.
//!
//! Each submodule implements exactly one step. The orchestrator
//! ([`crate::orchestrator`]) sequences them and turns their results into
//! [`crate::events::PipelineEvent`]s.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render/normalize ──▶ orientation ──▶ normalize ──▶ upscale ──▶ upload ──▶ extract ──▶ validate
//! (bytes)   (first page, JPEG)   (oracle, 0°     (rotate CCW)  (optional)  (URL)      (per batch) (optional)
//!                                 fallback)
//! ```
//!
//! 1. [`input`]: load bytes and sniff PDF / PNG / JPEG
//! 2. [`render`]: rasterise page one via pdfium on the blocking pool
//! 3. [`normalize`]: alpha flattening, JPEG encoding, CCW rotation with canvas expansion
//! 4. [`encode`]: base64 data URIs for the inline orientation image
//! 5. [`orientation`]: best-effort rotation verdict
//! 6. [`upscale`]: optional super-resolution through a scratch file
//! 7. [`upload`]: publish the image; the URL is shared by every batch
//! 8. [`extract`]: one schema-constrained oracle call per batch
//! 9. [`validate`]: optional correction pass per batch
//! 10. [`parse`]: response cleanup and the missing-key contract

pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod orientation;
pub mod parse;
pub mod render;
pub mod upload;
pub mod upscale;
pub mod validate;
