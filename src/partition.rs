//! Schema partitioning: split the parameter list into bounded batches.
//!
//! One oracle call per batch keeps each response schema narrow. A very wide
//! joint schema makes reasoning models slower, costlier and more likely to
//! truncate or degrade on the tail of the field list.
//!
//! The default configuration is two disjoint slices of the important
//! features (first six, remaining seven). Overlapping strategies are also
//! supported: the merge step lets a later batch overwrite an earlier value.

use crate::schema::{ParameterSchema, ReasoningField, OPTIONAL_FEATURES};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How to cut the ordered feature list into batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStrategy {
    /// Consecutive, non-overlapping slices cut at the given indices.
    ///
    /// `Disjoint { cuts: vec![6] }` over 13 features yields `[0..6, 6..13]`.
    Disjoint { cuts: Vec<usize> },
    /// Windows of `size` features advancing by `stride`.
    /// `stride < size` produces overlapping batches.
    Windowed { size: usize, stride: usize },
    /// Explicit key lists, used verbatim (may overlap).
    Explicit(Vec<Vec<String>>),
}

impl Default for BatchStrategy {
    fn default() -> Self {
        BatchStrategy::Disjoint { cuts: vec![6] }
    }
}

/// A subset of the schema processed in one oracle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBatch {
    /// Stable machine label, e.g. `batch1`.
    pub label: String,
    /// Human label used in status messages, e.g. `core parameters`.
    pub title: String,
    /// 1-based position of this batch in the run.
    pub index: usize,
    /// Number of batches in the run.
    pub total: usize,
    /// Parameter keys this batch must return, in schema order.
    pub features: Vec<String>,
    /// Reasoning fields the oracle must also fill.
    pub reasoning: Vec<ReasoningField>,
}

impl FeatureBatch {
    /// Keys every response for this batch must contain.
    pub fn required_keys(&self) -> Vec<String> {
        self.features
            .iter()
            .cloned()
            .chain(self.reasoning.iter().map(|r| r.name.clone()))
            .collect()
    }

    /// The JSON schema embedded in this batch's prompt.
    pub fn json_schema(&self, schema: &ParameterSchema) -> Value {
        schema.json_schema_for(&self.features, &self.reasoning)
    }

    pub fn is_reasoning_field(&self, key: &str) -> bool {
        self.reasoning.iter().any(|r| r.name == key)
    }
}

/// Split `features` according to `strategy`.
///
/// Empty slices are dropped and cut indices past the end are clamped, so a
/// strategy never produces an empty batch. When `include_optional` is set the
/// optional features are appended as one extra, disjoint batch.
pub fn partition(
    features: &[String],
    strategy: &BatchStrategy,
    reasoning: &[ReasoningField],
    include_optional: bool,
) -> Vec<FeatureBatch> {
    let mut groups: Vec<Vec<String>> = match strategy {
        BatchStrategy::Disjoint { cuts } => {
            let mut bounds: Vec<usize> = cuts.iter().map(|&c| c.min(features.len())).collect();
            bounds.sort_unstable();
            bounds.dedup();
            let mut groups = Vec::with_capacity(bounds.len() + 1);
            let mut start = 0;
            for end in bounds.into_iter().chain(std::iter::once(features.len())) {
                if end > start {
                    groups.push(features[start..end].to_vec());
                }
                start = start.max(end);
            }
            groups
        }
        BatchStrategy::Windowed { size, stride } => {
            let size = (*size).max(1);
            let stride = (*stride).max(1);
            let mut groups = Vec::new();
            let mut start = 0;
            while start < features.len() {
                let end = (start + size).min(features.len());
                groups.push(features[start..end].to_vec());
                if end == features.len() {
                    break;
                }
                start += stride;
            }
            groups
        }
        BatchStrategy::Explicit(lists) => lists.iter().filter(|l| !l.is_empty()).cloned().collect(),
    };

    let mut optional_index = None;
    if include_optional {
        optional_index = Some(groups.len());
        groups.push(OPTIONAL_FEATURES.iter().map(|s| s.to_string()).collect());
    }

    let total = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, features)| FeatureBatch {
            label: format!("batch{}", i + 1),
            title: batch_title(i, optional_index),
            index: i + 1,
            total,
            features,
            reasoning: reasoning.to_vec(),
        })
        .collect()
}

fn batch_title(i: usize, optional_index: Option<usize>) -> String {
    if Some(i) == optional_index {
        return "optional parameters".to_string();
    }
    match i {
        0 => "core parameters".to_string(),
        1 => "secondary parameters".to_string(),
        n => format!("parameter group {}", n + 1),
    }
}
