//! Extraction: one oracle call per feature batch.
//!
//! Unlike orientation, extraction failures are fatal for the file: a
//! transport error, an HTTP error or unparseable content aborts the run.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::oracle::{infer_with_retry, ImageRef, OracleRequest, VisionOracle};
use crate::partition::FeatureBatch;
use crate::pipeline::parse::{apply_contract, parse_object, BatchValues};
use crate::prompts::{extraction_user_prompt, ANALYSIS_SYSTEM_PROMPT};
use crate::schema::ParameterSchema;
use std::time::Duration;
use tracing::{debug, info};

/// Build the extraction request for `batch`.
///
/// The image is referenced by URL, no response format is forced and the
/// extraction model chooses its own sampling settings.
pub fn extraction_request(
    image_url: &str,
    batch: &FeatureBatch,
    schema: &ParameterSchema,
    name: &str,
    config: &ExtractionConfig,
) -> OracleRequest {
    OracleRequest {
        label: format!("{name}/{}", batch.label),
        model: config.extraction_model.clone(),
        system: ANALYSIS_SYSTEM_PROMPT.to_string(),
        user_text: extraction_user_prompt(&batch.json_schema(schema)),
        image: ImageRef::Url(image_url.to_string()),
        max_tokens: None,
        temperature: None,
        json_mode: false,
        timeout: Duration::from_secs(config.api_timeout_secs),
    }
}

/// Extract `batch`'s parameters from the hosted image.
pub async fn extract_batch(
    oracle: &dyn VisionOracle,
    image_url: &str,
    batch: &FeatureBatch,
    schema: &ParameterSchema,
    name: &str,
    config: &ExtractionConfig,
) -> Result<BatchValues, ExtractError> {
    let request = extraction_request(image_url, batch, schema, name, config);
    debug!(
        "{}: extraction prompt {} chars, {} keys",
        request.label,
        request.user_text.len(),
        batch.features.len()
    );

    let content = infer_with_retry(oracle, &request, config.max_retries, config.retry_backoff_ms)
        .await
        .map_err(|source| ExtractError::Oracle {
            stage: "Extraction",
            batch: batch.label.clone(),
            source,
        })?;

    let map = parse_object(&content, &batch.label)?;
    let values = apply_contract(map, batch, config.missing_key_policy, name)?;
    info!(
        "{}: {} extracted {} values ({} missing)",
        name,
        batch.label,
        values.values.len(),
        values.missing.len()
    );
    Ok(values)
}
