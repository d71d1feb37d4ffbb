//! Validation post-pass: send a batch's values back with the image for correction.
//!
//! Disabled unless [`ExtractionConfig::validate`] is set. When enabled, the
//! validated mapping replaces the extracted one. Same output contract and
//! same failure semantics as extraction.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::oracle::{infer_with_retry, ImageRef, OracleRequest, VisionOracle};
use crate::partition::FeatureBatch;
use crate::pipeline::parse::{apply_contract, parse_object, BatchValues};
use crate::prompts::{validation_user_prompt, VALIDATOR_SYSTEM_PROMPT};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

pub fn validation_request(
    image_url: &str,
    batch: &FeatureBatch,
    extracted: &BatchValues,
    name: &str,
    config: &ExtractionConfig,
) -> OracleRequest {
    let extracted_json = serde_json::to_value(&extracted.values).unwrap_or(Value::Null);
    OracleRequest {
        label: format!("{name}/{}/validate", batch.label),
        model: config.extraction_model.clone(),
        system: VALIDATOR_SYSTEM_PROMPT.to_string(),
        user_text: validation_user_prompt(&extracted_json),
        image: ImageRef::Url(image_url.to_string()),
        max_tokens: None,
        temperature: None,
        json_mode: false,
        timeout: Duration::from_secs(config.api_timeout_secs),
    }
}

/// Validate `extracted` against the image and return the corrected values.
///
/// Reasoning fields the validator drops are carried over from `extracted`.
pub async fn validate_batch(
    oracle: &dyn VisionOracle,
    image_url: &str,
    batch: &FeatureBatch,
    extracted: &BatchValues,
    name: &str,
    config: &ExtractionConfig,
) -> Result<BatchValues, ExtractError> {
    let request = validation_request(image_url, batch, extracted, name, config);
    let content = infer_with_retry(oracle, &request, config.max_retries, config.retry_backoff_ms)
        .await
        .map_err(|source| ExtractError::Oracle {
            stage: "Validation",
            batch: batch.label.clone(),
            source,
        })?;

    let mut map = parse_object(&content, &batch.label)?;
    for (key, text) in extracted.reasoning.iter() {
        if !map.contains_key(key) {
            map.insert(key.to_string(), Value::String(text.to_string()));
        }
    }

    let validated = apply_contract(map, batch, config.missing_key_policy, name)?;
    let changed = validated
        .values
        .iter()
        .filter(|(k, v)| extracted.values.get(k) != Some(*v))
        .count();
    info!("{}: {} validated, {} value(s) corrected", name, batch.label, changed);
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingKeyPolicy;
    use crate::error::OracleError;
    use crate::partition::{partition, BatchStrategy};
    use crate::schema::ReasoningField;
    use async_trait::async_trait;

    struct Fixed(String);

    #[async_trait]
    impl VisionOracle for Fixed {
        async fn infer(&self, request: &OracleRequest) -> Result<String, OracleError> {
            assert!(request.user_text.contains("\"rod_end\": \"THREAD M20\""));
            Ok(self.0.clone())
        }
    }

    fn batch() -> FeatureBatch {
        partition(
            &["rod_end".to_string(), "fluid".to_string()],
            &BatchStrategy::Disjoint { cuts: vec![] },
            &[ReasoningField::close_length()],
            false,
        )
        .remove(0)
    }

    fn extracted(batch: &FeatureBatch) -> BatchValues {
        let mut map = serde_json::Map::new();
        map.insert("rod_end".into(), "THREAD M20".into());
        map.insert("fluid".into(), "AIR".into());
        map.insert("close_length_reasoning".into(), "from table".into());
        apply_contract(map, batch, MissingKeyPolicy::FillNa, "a.pdf").unwrap()
    }

    #[tokio::test]
    async fn validated_values_replace_extracted() {
        let batch = batch();
        let oracle = Fixed(r#"{"rod_end": "THREAD M20", "fluid": "NA"}"#.into());
        let out = validate_batch(
            &oracle,
            "https://i.example/a.jpg",
            &batch,
            &extracted(&batch),
            "a.pdf",
            &ExtractionConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.values.get("fluid"), Some("NA"));
        assert_eq!(out.values.get("close_length_reasoning"), Some("from table"));
        assert!(out.missing.is_empty());
    }
}
