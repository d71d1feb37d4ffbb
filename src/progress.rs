//! Progress-callback trait for per-file and per-batch extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe a
//! run without consuming its event stream. The orchestrator calls these hooks
//! alongside the [`crate::events::PipelineEvent`]s it emits.
//!
//! # Example
//!
//! ```rust
//! use drawspec::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     batches: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, file: &str, batch: &str, index: usize, total: usize) {
//!         self.batches.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file}: {batch} ({index}/{total}) done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     batches: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::events::Stage;
use std::sync::Arc;

/// Called by the orchestrator as it advances through files and batches.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `parallel_batches` enabled,
/// `on_batch_complete` may be called concurrently for batches of the same
/// file; guard shared mutable state accordingly.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first file of a multi-file run.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file enters the pipeline.
    ///
    /// # Arguments
    /// * `index`: 1-based position of the file in the run
    /// * `total`: number of files in the run
    /// * `file`: display name
    fn on_file_start(&self, index: usize, total: usize, file: &str) {
        let _ = (index, total, file);
    }

    /// Called on every state transition of a file's run.
    fn on_stage(&self, file: &str, stage: Stage, progress: f32) {
        let _ = (file, stage, progress);
    }

    /// Called when one extraction batch (and its validation, if enabled) has merged.
    fn on_batch_complete(&self, file: &str, batch: &str, index: usize, total: usize) {
        let _ = (file, batch, index, total);
    }

    /// Called when a file's run ends in the `failed` state.
    fn on_file_error(&self, file: &str, error: &str) {
        let _ = (file, error);
    }

    /// Called when a file's run ends in the `done` state.
    ///
    /// `parameters` is the number of keys in the merged result.
    fn on_file_complete(&self, file: &str, parameters: usize) {
        let _ = (file, parameters);
    }

    /// Called once after every file of a multi-file run has been attempted.
    fn on_run_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
