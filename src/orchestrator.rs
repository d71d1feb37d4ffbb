//! Pipeline orchestration: run drawings through the stage sequence.
//!
//! One file moves strictly forward through
//! `preparing → converting? → orientation-check → rotating? → upscaling? →
//! uploading → extracting (per batch, optionally validating) → finalizing`,
//! emitting one [`PipelineEvent::Status`] per transition and then exactly one
//! terminal event. Every stage error, and any panic, becomes a
//! [`PipelineEvent::Failed`]; [`Extractor::process_file`] itself never fails.
//!
//! Multi-file runs process files one at a time and isolate failures: a bad
//! file produces an error record and the run moves on.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::events::{FileOutcome, FileRecord, ParameterValues, PipelineEvent, Stage};
use crate::oracle::{OpenAiOracle, VisionOracle};
use crate::partition::{partition, FeatureBatch};
use crate::pipeline::input::{self, DrawingInput};
use crate::pipeline::normalize::{self, ProcessedImage};
use crate::pipeline::orientation::detect_orientation;
use crate::pipeline::parse::BatchValues;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::upload::{ImageHost, ImgbbHost};
use crate::pipeline::upscale::{upscale_or_keep, Upscaler};
use crate::pipeline::{extract, validate};
use crate::schema::{ParameterSchema, ReasoningField, NA};
use futures::future::BoxFuture;
use futures::stream::{FuturesOrdered, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Runs drawings through the extraction pipeline.
///
/// Holds the configuration plus one instance of every external
/// collaborator. [`Extractor::new`] wires the production clients;
/// [`Extractor::with_components`] accepts any implementation, which is how
/// the tests run the whole pipeline without a network or pdfium.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    schema: ParameterSchema,
    oracle: Arc<dyn VisionOracle>,
    host: Arc<dyn ImageHost>,
    rasterizer: Arc<dyn PageRasterizer>,
    upscaler: Option<Arc<dyn Upscaler>>,
}

impl Extractor {
    /// Build an extractor using the OpenAI-compatible oracle, the ImgBB host
    /// and pdfium.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let oracle = OpenAiOracle::from_config(&config)
            .map_err(|e| ExtractError::Internal(e.to_string()))?;
        let host = ImgbbHost::from_config(&config);
        Ok(Self::with_components(
            config,
            Arc::new(oracle),
            Arc::new(host),
            Arc::new(PdfiumRasterizer),
        ))
    }

    pub fn with_components(
        config: ExtractionConfig,
        oracle: Arc<dyn VisionOracle>,
        host: Arc<dyn ImageHost>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            config,
            schema: ParameterSchema::important(),
            oracle,
            host,
            rasterizer,
            upscaler: None,
        }
    }

    /// Attach an upscaler; it only runs when `config.upscale` is set.
    pub fn with_upscaler(mut self, upscaler: Arc<dyn Upscaler>) -> Self {
        self.upscaler = Some(upscaler);
        self
    }

    /// Replace the parameter schema (default: the thirteen important features).
    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// The batches every file is extracted in.
    pub fn batches(&self) -> Vec<FeatureBatch> {
        let features: Vec<String> = self.schema.names().map(str::to_string).collect();
        partition(
            &features,
            &self.config.batch_strategy,
            &[ReasoningField::close_length()],
            self.config.include_optional,
        )
    }

    /// Run one drawing through the pipeline.
    ///
    /// `emit` receives every status event and then exactly one terminal
    /// event. The return value mirrors the terminal event.
    pub async fn process_file<F>(&self, input: &DrawingInput, emit: &mut F) -> Result<FileOutcome, String>
    where
        F: FnMut(PipelineEvent) + Send,
    {
        let span = info_span!("file", name = %input.name);
        let start = Instant::now();

        let result = AssertUnwindSafe(self.run(input, emit).instrument(span))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExtractError::Internal(panic_message(panic))));

        match result {
            Ok(outcome) => {
                info!(
                    "{}: done, {} values in {:?}",
                    input.name,
                    outcome.data.len(),
                    start.elapsed()
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_file_complete(&input.name, outcome.data.len());
                }
                emit(PipelineEvent::Completed {
                    final_result: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("{}: failed: {}", input.name, message);
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_file_error(&input.name, &message);
                }
                emit(PipelineEvent::Failed {
                    message: message.clone(),
                });
                Err(message)
            }
        }
    }

    /// Process already-loaded drawings one after another.
    ///
    /// `on_event` receives `(file index, event)` for every event of every
    /// file. Always returns one record per input, in input order.
    pub async fn process_files<F>(&self, inputs: &[DrawingInput], mut on_event: F) -> Vec<FileRecord>
    where
        F: FnMut(usize, &PipelineEvent) + Send,
    {
        let sources = inputs.iter().map(Source::Memory).collect();
        self.run_many(sources, &mut on_event).await
    }

    /// Load and process drawings from disk.
    ///
    /// Each file is read just before it is processed and released right
    /// after. A file that cannot be read fails on its own, like any other
    /// stage error.
    pub async fn process_paths<F>(&self, paths: &[PathBuf], mut on_event: F) -> Vec<FileRecord>
    where
        F: FnMut(usize, &PipelineEvent) + Send,
    {
        let sources = paths.iter().map(|p| Source::Disk(p.as_path())).collect();
        self.run_many(sources, &mut on_event).await
    }

    async fn run_many<F>(&self, inputs: Vec<Source<'_>>, on_event: &mut F) -> Vec<FileRecord>
    where
        F: FnMut(usize, &PipelineEvent) + Send,
    {
        let total = inputs.len();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_run_start(total);
        }

        let mut records = Vec::with_capacity(total);
        for (index, source) in inputs.into_iter().enumerate() {
            let loaded = match source {
                Source::Memory(input) => Ok(Cow::Borrowed(input)),
                Source::Disk(path) => input::load_path(path)
                    .await
                    .map(Cow::Owned)
                    .map_err(|e| (path, e)),
            };
            let record = match loaded {
                Ok(input) => {
                    if let Some(cb) = &self.config.progress_callback {
                        cb.on_file_start(index + 1, total, &input.name);
                    }
                    let result = self
                        .process_file(&input, &mut |event| on_event(index, &event))
                        .await;
                    FileRecord {
                        filename: input.name.clone(),
                        result,
                    }
                }
                Err((path, e)) => {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    let message = e.to_string();
                    if let Some(cb) = &self.config.progress_callback {
                        cb.on_file_start(index + 1, total, &filename);
                        cb.on_file_error(&filename, &message);
                    }
                    on_event(
                        index,
                        &PipelineEvent::Failed {
                            message: message.clone(),
                        },
                    );
                    FileRecord {
                        filename,
                        result: Err(message),
                    }
                }
            };
            records.push(record);
        }

        let succeeded = records.iter().filter(|r| r.is_success()).count();
        info!("Run complete: {}/{} files extracted", succeeded, total);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_run_complete(total, succeeded);
        }
        records
    }

    fn status<F>(&self, name: &str, emit: &mut F, stage: Stage, message: String)
    where
        F: FnMut(PipelineEvent) + Send,
    {
        debug!("{}: {}", name, message);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage(name, stage, stage.progress());
        }
        emit(PipelineEvent::status(stage, message));
    }

    async fn run<F>(&self, input: &DrawingInput, emit: &mut F) -> Result<FileOutcome, ExtractError>
    where
        F: FnMut(PipelineEvent) + Send,
    {
        let name = input.name.as_str();
        let config = &self.config;

        // ── Preparing ────────────────────────────────────────────────────
        self.status(name, emit, Stage::Preparing, "Preparing file...".into());
        let kind = input.kind()?;

        // ── Converting ───────────────────────────────────────────────────
        if kind.is_pdf() {
            self.status(name, emit, Stage::Converting, "Converting PDF to image...".into());
        }
        let image = normalize::rasterize(
            input,
            kind,
            self.rasterizer.as_ref(),
            config.render_scale,
            config.jpeg_quality,
        )
        .await?;

        // ── Orientation ──────────────────────────────────────────────────
        self.status(
            name,
            emit,
            Stage::OrientationCheck,
            format!("AI ({}) is checking orientation...", config.orientation_model),
        );
        let verdict = detect_orientation(self.oracle.as_ref(), &image, name, config).await;
        if let Some(reasoning) = &verdict.reasoning {
            debug!("{}: orientation reasoning: {}", name, reasoning);
        }

        let image = if verdict.rotation.is_identity() {
            image
        } else {
            self.status(
                name,
                emit,
                Stage::Rotating,
                format!("Rotating image by {} degrees...", verdict.rotation.degrees()),
            );
            normalize::rotate(image, verdict.rotation, config.jpeg_quality)
        };

        // ── Upscaling ────────────────────────────────────────────────────
        let image = match (&self.upscaler, config.upscale) {
            (Some(upscaler), true) => {
                self.status(name, emit, Stage::Upscaling, "Upscaling image...".into());
                upscale_or_keep(upscaler.as_ref(), image, name).await
            }
            _ => image,
        };

        // ── Uploading ────────────────────────────────────────────────────
        self.status(
            name,
            emit,
            Stage::Uploading,
            "Uploading image for analysis...".into(),
        );
        let image_url = self.host.upload(&image, name).await?;

        // ── Extracting ───────────────────────────────────────────────────
        let batches = self.batches();
        let results = if config.parallel_batches && batches.len() > 1 {
            self.extract_concurrently(&batches, &image_url, name, emit).await?
        } else {
            self.extract_sequentially(&batches, &image_url, name, emit).await?
        };

        // ── Finalizing ───────────────────────────────────────────────────
        self.status(name, emit, Stage::Finalizing, "Finalizing results...".into());
        Ok(self.merge(image, image_url, verdict.rotation, &batches, results, name))
    }

    async fn extract_sequentially<F>(
        &self,
        batches: &[FeatureBatch],
        image_url: &str,
        name: &str,
        emit: &mut F,
    ) -> Result<Vec<BatchValues>, ExtractError>
    where
        F: FnMut(PipelineEvent) + Send,
    {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            self.status(name, emit, extracting(batch), analyzing_message(batch));
            let extracted = self.extract(batch, image_url, name).await?;

            let values = if self.config.validate {
                self.status(name, emit, validating(batch), validating_message(batch));
                self.validate(batch, image_url, &extracted, name).await?
            } else {
                extracted
            };
            self.batch_done(name, batch);
            results.push(values);
        }
        Ok(results)
    }

    /// All batches share the uploaded URL and nothing else, so their calls
    /// can overlap. Results are still consumed, and reported, in batch order.
    ///
    /// The first failing batch fails the file; batches still in flight are
    /// dropped with the queue.
    async fn extract_concurrently<F>(
        &self,
        batches: &[FeatureBatch],
        image_url: &str,
        name: &str,
        emit: &mut F,
    ) -> Result<Vec<BatchValues>, ExtractError>
    where
        F: FnMut(PipelineEvent) + Send,
    {
        let mut pending: FuturesOrdered<BoxFuture<'_, Result<BatchValues, ExtractError>>> = batches
            .iter()
            .map(|batch| self.extract_and_validate(batch, image_url, name).boxed())
            .collect();

        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            self.status(name, emit, extracting(batch), analyzing_message(batch));
            if self.config.validate {
                self.status(name, emit, validating(batch), validating_message(batch));
            }
            let values = pending.next().await.ok_or_else(|| {
                ExtractError::Internal(format!("no result for {}", batch.label))
            })??;
            self.batch_done(name, batch);
            results.push(values);
        }
        Ok(results)
    }

    async fn extract_and_validate(
        &self,
        batch: &FeatureBatch,
        image_url: &str,
        name: &str,
    ) -> Result<BatchValues, ExtractError> {
        let extracted = self.extract(batch, image_url, name).await?;
        if self.config.validate {
            self.validate(batch, image_url, &extracted, name).await
        } else {
            Ok(extracted)
        }
    }

    async fn extract(
        &self,
        batch: &FeatureBatch,
        image_url: &str,
        name: &str,
    ) -> Result<BatchValues, ExtractError> {
        extract::extract_batch(
            self.oracle.as_ref(),
            image_url,
            batch,
            &self.schema,
            name,
            &self.config,
        )
        .await
    }

    async fn validate(
        &self,
        batch: &FeatureBatch,
        image_url: &str,
        extracted: &BatchValues,
        name: &str,
    ) -> Result<BatchValues, ExtractError> {
        validate::validate_batch(
            self.oracle.as_ref(),
            image_url,
            batch,
            extracted,
            name,
            &self.config,
        )
        .await
    }

    fn batch_done(&self, name: &str, batch: &FeatureBatch) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(name, &batch.label, batch.index, batch.total);
        }
    }

    fn merge(
        &self,
        image: ProcessedImage,
        image_url: String,
        rotation: normalize::Rotation,
        batches: &[FeatureBatch],
        results: Vec<BatchValues>,
        name: &str,
    ) -> FileOutcome {
        let mut data = ParameterValues::new();
        let mut reasoning = ParameterValues::new();
        let mut omitted: Vec<String> = Vec::new();
        let mut returned: HashSet<String> = HashSet::new();

        for (batch, values) in batches.iter().zip(results) {
            let filled = |key: &str| values.missing.iter().any(|m| m == key);
            for (key, text) in values.reasoning.iter() {
                if !filled(key) {
                    reasoning.insert(format!("{}.{}", batch.label, key), text);
                }
            }
            for (key, value) in values.values.iter() {
                if filled(key) {
                    if !omitted.iter().any(|k| k == key) {
                        omitted.push(key.to_string());
                    }
                } else {
                    returned.insert(key.to_string());
                }
                // Overlapping batches: "NA" never replaces a value another batch found.
                if value == NA && data.get(key).is_some_and(|v| v != NA) {
                    continue;
                }
                data.insert(key, value);
            }
        }

        let mut missing: Vec<String> = omitted
            .into_iter()
            .filter(|key| !returned.contains(key))
            .collect();

        // Every schema key is present even if the batches were configured to skip some.
        for key in self.schema.names() {
            if !data.contains_key(key) {
                warn!("{}: no batch covered '{}', recording NA", name, key);
                data.insert(key, NA);
                missing.push(key.to_string());
            }
        }
        if !missing.is_empty() {
            debug!("{}: still unresolved after merge: {}", name, missing.join(", "));
        }

        FileOutcome {
            data,
            image_mime: image.mime_type(),
            image: image.bytes,
            image_url,
            rotation,
            reasoning,
            missing,
        }
    }
}

/// Where one file of a multi-file run comes from.
enum Source<'a> {
    Memory(&'a DrawingInput),
    Disk(&'a Path),
}

/// Extract every drawing in `paths` with the production clients.
///
/// # Example
/// ```rust,no_run
/// use drawspec::{extract_paths, ExtractionConfig};
/// use std::borrow::Cow;
/// use std::collections::HashSet;
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder()
///     .api_key(std::env::var("OPENAI_API_KEY")?)
///     .image_host_key(std::env::var("IMGBB_API_KEY")?)
///     .build()?;
/// let records = extract_paths(&[PathBuf::from("cyl-100.pdf")], config).await?;
/// for record in &records {
///     match &record.result {
///         Ok(outcome) => println!("{}: {:?}", record.filename, outcome.data.get("bore_diameter")),
///         Err(message) => eprintln!("{}: {}", record.filename, message),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_paths(
    paths: &[PathBuf],
    config: ExtractionConfig,
) -> Result<Vec<FileRecord>, ExtractError> {
    let extractor = Extractor::new(config)?;
    Ok(extractor.process_paths(paths, |_, _| {}).await)
}

fn extracting(batch: &FeatureBatch) -> Stage {
    Stage::Extracting {
        index: batch.index,
        total: batch.total,
    }
}

fn validating(batch: &FeatureBatch) -> Stage {
    Stage::Validating {
        index: batch.index,
        total: batch.total,
    }
}

fn analyzing_message(batch: &FeatureBatch) -> String {
    format!(
        "Analyzing {} (Batch {}/{})...",
        batch.title, batch.index, batch.total
    )
}

fn validating_message(batch: &FeatureBatch) -> String {
    format!(
        "Validating {} (Batch {}/{})...",
        batch.title, batch.index, batch.total
    )
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "pipeline stage panicked".to_string())
}
