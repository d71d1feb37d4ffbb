//! Configuration types for drawing parameter extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Credentials live here too and are
//! handed to each client at construction; nothing reads API keys from
//! process globals once a config exists.

use crate::error::ExtractError;
use crate::partition::BatchStrategy;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default image-hosting upload endpoint.
pub const DEFAULT_IMAGE_HOST_URL: &str = "https://api.imgbb.com/1/upload";

/// Configuration for a drawing extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use drawspec::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-test")
///     .image_host_key("imgbb-test")
///     .validate(true)
///     .build()
///     .unwrap();
/// assert!(config.validate);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of the OpenAI-compatible chat-completions API.
    pub api_base_url: String,

    /// Bearer token for the oracle endpoint.
    pub api_key: Option<String>,

    /// Model used for the orientation check. Default: `gpt-4o`.
    pub orientation_model: String,

    /// Reasoning model used for extraction and validation. Default: `o4-mini-2025-04-16`.
    pub extraction_model: String,

    /// Output-token cap for the orientation call. Default: 500.
    pub orientation_max_tokens: usize,

    /// Timeout for the orientation call in seconds. Default: 30.
    pub orientation_timeout_secs: u64,

    /// Timeout for extraction and validation calls in seconds. Default: 300.
    ///
    /// Reasoning models routinely take a minute or more on a dense drawing.
    pub api_timeout_secs: u64,

    /// Retries on transient oracle failures (429, 5xx, timeouts). Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Upscale factor when rasterising the first PDF page. Default: 2.0.
    pub render_scale: f32,

    /// JPEG quality for rasterised and rotated images. Default: 95.
    pub jpeg_quality: u8,

    /// API key for the image-hosting service.
    pub image_host_key: Option<String>,

    /// Upload endpoint of the image-hosting service.
    pub image_host_url: String,

    /// How the important features are cut into batches. Default: 6 / 7.
    pub batch_strategy: BatchStrategy,

    /// Append the optional-features batch. Default: false.
    pub include_optional: bool,

    /// Run the validation post-pass after each extraction batch. Default: false.
    pub validate: bool,

    /// Run the upscale stage when an upscaler is attached. Default: false.
    pub upscale: bool,

    /// Issue the independent extraction batches of one file concurrently. Default: false.
    pub parallel_batches: bool,

    /// What to do when a response omits a required key. Default: [`MissingKeyPolicy::FillNa`].
    pub missing_key_policy: MissingKeyPolicy,

    /// Optional batch-level progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            orientation_model: "gpt-4o".to_string(),
            extraction_model: "o4-mini-2025-04-16".to_string(),
            orientation_max_tokens: 500,
            orientation_timeout_secs: 30,
            api_timeout_secs: 300,
            max_retries: 2,
            retry_backoff_ms: 500,
            render_scale: 2.0,
            jpeg_quality: 95,
            image_host_key: None,
            image_host_url: DEFAULT_IMAGE_HOST_URL.to_string(),
            batch_strategy: BatchStrategy::default(),
            include_optional: false,
            validate: false,
            upscale: false,
            parallel_batches: false,
            missing_key_policy: MissingKeyPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("orientation_model", &self.orientation_model)
            .field("extraction_model", &self.extraction_model)
            .field("orientation_timeout_secs", &self.orientation_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("render_scale", &self.render_scale)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("image_host_key", &self.image_host_key.as_ref().map(|_| "<redacted>"))
            .field("image_host_url", &self.image_host_url)
            .field("batch_strategy", &self.batch_strategy)
            .field("include_optional", &self.include_optional)
            .field("validate", &self.validate)
            .field("upscale", &self.upscale)
            .field("parallel_batches", &self.parallel_batches)
            .field("missing_key_policy", &self.missing_key_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn orientation_model(mut self, model: impl Into<String>) -> Self {
        self.config.orientation_model = model.into();
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn orientation_max_tokens(mut self, n: usize) -> Self {
        self.config.orientation_max_tokens = n;
        self
    }

    pub fn orientation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.orientation_timeout_secs = secs.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn image_host_key(mut self, key: impl Into<String>) -> Self {
        self.config.image_host_key = Some(key.into());
        self
    }

    pub fn image_host_url(mut self, url: impl Into<String>) -> Self {
        self.config.image_host_url = url.into();
        self
    }

    pub fn batch_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.config.batch_strategy = strategy;
        self
    }

    pub fn include_optional(mut self, v: bool) -> Self {
        self.config.include_optional = v;
        self
    }

    pub fn validate(mut self, v: bool) -> Self {
        self.config.validate = v;
        self
    }

    pub fn upscale(mut self, v: bool) -> Self {
        self.config.upscale = v;
        self
    }

    pub fn parallel_batches(mut self, v: bool) -> Self {
        self.config.parallel_batches = v;
        self
    }

    pub fn missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.config.missing_key_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(c.render_scale > 0.0 && c.render_scale <= 8.0) {
            return Err(ExtractError::InvalidConfig(format!(
                "render scale must be in (0, 8], got {}",
                c.render_scale
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(ExtractError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        match &c.batch_strategy {
            BatchStrategy::Windowed { size: 0, .. } | BatchStrategy::Windowed { stride: 0, .. } => {
                return Err(ExtractError::InvalidConfig(
                    "windowed batch size and stride must be ≥ 1".into(),
                ));
            }
            BatchStrategy::Explicit(lists) if lists.iter().all(|l| l.is_empty()) => {
                return Err(ExtractError::InvalidConfig(
                    "explicit batch strategy has no features".into(),
                ));
            }
            _ => {}
        }
        Ok(self.config)
    }
}

/// Policy for a response that omits a key its batch requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingKeyPolicy {
    /// Substitute the "NA" sentinel and log a warning. (default)
    #[default]
    FillNa,
    /// Fail the file with a contract-violation error.
    Reject,
}
