//! Pipeline events and per-file results.
//!
//! A file's run emits zero or more [`PipelineEvent::Status`] events followed
//! by exactly one terminal event, either [`PipelineEvent::Failed`] or
//! [`PipelineEvent::Completed`]. Serialised, the events take the wire shapes
//! `{"status", "progress"}`, `{"error"}` and `{"final_result": {"data", "image"}}`.

use crate::pipeline::encode::serialize_base64;
use crate::pipeline::normalize::Rotation;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A state of the per-file state machine, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum Stage {
    Preparing,
    Converting,
    OrientationCheck,
    Rotating,
    Upscaling,
    Uploading,
    Extracting { index: usize, total: usize },
    Validating { index: usize, total: usize },
    Finalizing,
}

impl Stage {
    /// Progress fraction reported on entering this stage.
    ///
    /// Batch stages share the band `[0.4, 0.8]`; each batch gets an equal
    /// slice, with validation halfway through its batch's slice.
    pub fn progress(self) -> f32 {
        match self {
            Stage::Preparing => 0.05,
            Stage::Converting => 0.10,
            Stage::OrientationCheck => 0.25,
            Stage::Rotating => 0.30,
            Stage::Upscaling => 0.32,
            Stage::Uploading => 0.35,
            Stage::Extracting { index, total } => batch_progress(index, total, 0.0),
            Stage::Validating { index, total } => batch_progress(index, total, 0.5),
            Stage::Finalizing => 0.90,
        }
    }
}

fn batch_progress(index: usize, total: usize, within: f32) -> f32 {
    let total = total.max(1) as f32;
    let slot = index.saturating_sub(1) as f32 + within;
    0.4 + 0.4 * slot / total
}

/// Ordered parameter-name → value mapping.
///
/// Insertion order is preserved and re-inserting a key overwrites its value
/// in place, so a later batch can correct an earlier one without reordering
/// the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterValues(Vec<(String, String)>);

impl ParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Merge `other` into `self`; values from `other` win on conflict.
    pub fn merge(&mut self, other: ParameterValues) {
        for (k, v) in other.0 {
            self.insert(k, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ParameterValues {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut values = ParameterValues::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

impl Serialize for ParameterValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// The successful result of one file's run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    /// Merged mapping over all batches, reasoning fields included.
    pub data: ParameterValues,
    /// Final corrected image, exactly as uploaded.
    #[serde(serialize_with = "serialize_base64")]
    pub image: Vec<u8>,
    #[serde(skip)]
    pub image_mime: &'static str,
    #[serde(skip)]
    pub image_url: String,
    #[serde(skip)]
    pub rotation: Rotation,
    /// Reasoning text keyed by `<batch label>.<field>`.
    #[serde(skip)]
    pub reasoning: ParameterValues,
    /// Keys no batch returned, recorded as "NA". Each key appears once.
    #[serde(skip)]
    pub missing: Vec<String>,
}

/// One event of a file's run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    Status {
        #[serde(skip)]
        stage: Stage,
        #[serde(rename = "status")]
        message: String,
        progress: f32,
    },
    Failed {
        #[serde(rename = "error")]
        message: String,
    },
    Completed {
        final_result: FileOutcome,
    },
}

impl PipelineEvent {
    pub fn status(stage: Stage, message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            stage,
            message: message.into(),
            progress: stage.progress(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Status { .. })
    }

    pub fn progress(&self) -> Option<f32> {
        match self {
            PipelineEvent::Status { progress, .. } => Some(*progress),
            PipelineEvent::Failed { .. } => None,
            PipelineEvent::Completed { .. } => Some(1.0),
        }
    }
}

/// The record kept for one file of a multi-file run.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub filename: String,
    pub result: Result<FileOutcome, String>,
}

impl FileRecord {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

impl Serialize for FileRecord {
    /// `{"filename", "data"}` on success, `{"filename", "error"}` on failure.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("filename", &self.filename)?;
        match &self.result {
            Ok(outcome) => map.serialize_entry("data", &outcome.data)?,
            Err(message) => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}
