//! Image hosting: publish the corrected drawing at a public URL.
//!
//! Extraction and validation reference the image by URL, so the upload is a
//! hard dependency: without a URL the file fails. There is no inline
//! fallback.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::normalize::ProcessedImage;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// A service that turns image bytes into a publicly resolvable URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: &ProcessedImage, name: &str) -> Result<String, ExtractError>;
}

/// [`ImageHost`] for the ImgBB upload API.
///
/// `POST <url>?key=<api key>` with a multipart `image` part; the public URL
/// is read from `data.url` when `success` is true.
#[derive(Clone)]
pub struct ImgbbHost {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ImgbbHost {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.image_host_url.clone(),
            config.image_host_key.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    async fn upload(&self, image: &ProcessedImage, name: &str) -> Result<String, ExtractError> {
        let key = self.api_key.as_deref().ok_or(ExtractError::UploadKeyMissing)?;

        let part = Part::bytes(image.bytes.clone())
            .file_name(upload_file_name(name, image.extension()))
            .mime_str(image.mime_type())
            .map_err(|e| ExtractError::Internal(e.to_string()))?;
        let form = Form::new().part("image", part);

        debug!("{}: uploading {} bytes", name, image.bytes.len());
        let response = self
            .client
            .post(&self.url)
            .query(&[("key", key)])
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractError::UploadFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ExtractError::UploadFailed {
            reason: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ExtractError::UploadFailed {
                reason: format!("HTTP {status}"),
            });
        }

        let url = parse_upload_response(&body)?;
        info!("{}: image hosted at {}", name, url);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
}

/// Extract the public URL from an upload response body.
pub fn parse_upload_response(body: &str) -> Result<String, ExtractError> {
    let parsed: UploadResponse =
        serde_json::from_str(body).map_err(|e| ExtractError::UploadFailed {
            reason: format!("unreadable response: {e}"),
        })?;
    if !parsed.success {
        return Err(ExtractError::UploadFailed {
            reason: "service reported failure".into(),
        });
    }
    parsed
        .data
        .and_then(|d| d.url)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ExtractError::UploadFailed {
            reason: "response has no URL".into(),
        })
}

fn upload_file_name(name: &str, extension: &str) -> String {
    let stem = std::path::Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drawing".to_string());
    format!("{stem}.{extension}")
}
