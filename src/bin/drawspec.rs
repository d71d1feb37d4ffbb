//! CLI binary for drawspec.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig`, runs every input file and writes the report.

use anyhow::{Context, Result};
use clap::Parser;
use drawspec::report::{self, ReportTable};
use drawspec::{
    ExtractionConfig, ExtractionProgressCallback, Extractor, HttpUpscaler, MissingKeyPolicy,
    ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Bar positions per file; stage progress is a fraction of one file.
const FILE_STEPS: u64 = 100;

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders one bar for the whole run. Within a file the bar advances with
/// the stage fractions reported by the pipeline, so overall progress is
/// `(completed files + current fraction) / total files`.
struct CliProgressCallback {
    bar: ProgressBar,
    /// 0-based index of the file currently running.
    current: AtomicUsize,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {percent:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: AtomicUsize::new(0),
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, file: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(file))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish_file(&self) {
        let done = self.current.load(Ordering::SeqCst) as u64 + 1;
        self.bar.set_position(done * FILE_STEPS);
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64 * FILE_STEPS);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting parameters from {total_files} drawing(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, file: &str) {
        self.current.store(index.saturating_sub(1), Ordering::SeqCst);
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(file.to_string(), Instant::now());
        }
        self.bar.set_message(file.to_string());
    }

    fn on_stage(&self, file: &str, stage: Stage, progress: f32) {
        let base = self.current.load(Ordering::SeqCst) as u64 * FILE_STEPS;
        let within = (progress.clamp(0.0, 1.0) * FILE_STEPS as f32) as u64;
        self.bar.set_position(base + within);
        let label = match stage {
            Stage::Extracting { index, total } => format!("batch {index}/{total}"),
            Stage::Validating { index, total } => format!("validating {index}/{total}"),
            other => format!("{other:?}").to_lowercase(),
        };
        self.bar.set_message(format!("{file}  {}", dim(&label)));
    }

    fn on_file_complete(&self, file: &str, parameters: usize) {
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            green("✓"),
            file,
            dim(&format!("{parameters:>3} values")),
            dim(&format!("{:.1}s", self.elapsed(file))),
        ));
        self.finish_file();
    }

    fn on_file_error(&self, file: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).collect::<String>() + "\u{2026}"
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            file,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed(file))),
        ));
        self.finish_file();
    }

    fn on_run_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} drawing(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} drawings extracted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one drawing and print the table
  drawspec cylinder.pdf

  # Several drawings into a spreadsheet
  drawspec drawings/*.pdf -o report.xlsx

  # Add the optional parameter batch and a validation pass
  drawspec --include-optional --validate cylinder.png -o report.xlsx

  # Raw per-file records as JSON
  drawspec --json extracted_data.json drawings/*.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           API key for the vision models
  DRAWSPEC_API_BASE_URL    OpenAI-compatible endpoint (default https://api.openai.com/v1)
  IMGBB_API_KEY            Image-hosting key used to publish the drawing
  DRAWSPEC_UPSCALE_URL     Optional super-resolution endpoint
  PDFIUM_DYNAMIC_LIB_PATH  Directory containing libpdfium
  RUST_LOG                 Overrides the log filter
"#;

/// Extract cylinder parameters from engineering drawings using vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "drawspec",
    version,
    about = "Extract cylinder parameters from engineering drawings using vision LLMs",
    long_about = "Straighten scanned hydraulic and pneumatic cylinder drawings (PDF, PNG, JPEG), \
publish them to an image host and extract a fixed parameter schema with a reasoning model. \
Results are written as a parameter × file report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Drawing files (PDF, PNG or JPEG).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the report as an XLSX workbook.
    #[arg(short, long, env = "DRAWSPEC_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the raw per-file records as JSON.
    #[arg(long, env = "DRAWSPEC_JSON")]
    json: Option<PathBuf>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "DRAWSPEC_API_BASE_URL")]
    base_url: Option<String>,

    /// Image-hosting API key.
    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    imgbb_key: Option<String>,

    /// Extraction (reasoning) model.
    #[arg(long, env = "DRAWSPEC_MODEL")]
    model: Option<String>,

    /// Orientation-check model.
    #[arg(long, env = "DRAWSPEC_ORIENTATION_MODEL")]
    orientation_model: Option<String>,

    /// Run a validation pass after each batch.
    #[arg(long, env = "DRAWSPEC_VALIDATE")]
    validate: bool,

    /// Also extract the optional parameter batch.
    #[arg(long, env = "DRAWSPEC_INCLUDE_OPTIONAL")]
    include_optional: bool,

    /// Run the batches of a file concurrently.
    #[arg(long, env = "DRAWSPEC_PARALLEL_BATCHES")]
    parallel_batches: bool,

    /// Fail a file when the model omits a required key instead of recording NA.
    #[arg(long, env = "DRAWSPEC_STRICT")]
    strict: bool,

    /// Super-resolution endpoint; enables upscaling before upload.
    #[arg(long, env = "DRAWSPEC_UPSCALE_URL")]
    upscale_url: Option<String>,

    /// PDF rendering scale factor.
    #[arg(long, env = "DRAWSPEC_RENDER_SCALE", default_value_t = 2.0)]
    render_scale: f32,

    /// Retries per oracle call on transient failure.
    #[arg(long, env = "DRAWSPEC_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call extraction timeout in seconds.
    #[arg(long, env = "DRAWSPEC_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Truncate table cells to this many characters.
    #[arg(long, default_value_t = 40)]
    max_cell: usize,

    /// Disable progress bar.
    #[arg(long, env = "DRAWSPEC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DRAWSPEC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DRAWSPEC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let mut extractor = Extractor::new(config).context("Failed to initialise extractor")?;
    if let Some(url) = &cli.upscale_url {
        extractor = extractor.with_upscaler(Arc::new(HttpUpscaler::new(
            url.clone(),
            Duration::from_secs(cli.api_timeout),
        )));
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let started = Instant::now();
    let records = extractor.process_paths(&cli.files, |_, _| {}).await;
    let table = ReportTable::from_records(&records);

    if let Some(path) = &cli.output {
        table
            .write_xlsx(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    if let Some(path) = &cli.json {
        report::write_json(&records, path)
            .with_context(|| format!("Failed to write records to {}", path.display()))?;
    }

    if cli.output.is_none() || !cli.quiet {
        print!("{}", table.render_text(cli.max_cell));
    }

    let failed = records.iter().filter(|r| !r.is_success()).count();
    if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Extracted {}/{} drawings in {:.1}s",
                records.len() - failed,
                records.len(),
                started.elapsed().as_secs_f64()
            );
        }
        for path in cli.output.iter().chain(cli.json.iter()) {
            eprintln!("   {}  {}", dim("→"), bold(&path.display().to_string()));
        }
    }

    if failed == records.len() {
        anyhow::bail!("No drawing could be processed");
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let defaults = ExtractionConfig::default();
    let mut builder = ExtractionConfig::builder()
        .api_base_url(cli.base_url.clone().unwrap_or(defaults.api_base_url))
        .extraction_model(cli.model.clone().unwrap_or(defaults.extraction_model))
        .orientation_model(
            cli.orientation_model
                .clone()
                .unwrap_or(defaults.orientation_model),
        )
        .validate(cli.validate)
        .include_optional(cli.include_optional)
        .parallel_batches(cli.parallel_batches)
        .upscale(cli.upscale_url.is_some())
        .render_scale(cli.render_scale)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if cli.strict {
        builder = builder.missing_key_policy(MissingKeyPolicy::Reject);
    }
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(key) = &cli.imgbb_key {
        builder = builder.image_host_key(key.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
