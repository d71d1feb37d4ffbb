//! Optional super-resolution stage.
//!
//! The upscaling service takes a file, so the image is staged in a scratch
//! [`NamedTempFile`] and the request body is streamed from it. The file is
//! deleted when the guard drops, on success, on error and on panic alike.
//!
//! Upscaling only improves legibility; a failure keeps the input image.

use crate::error::ExtractError;
use crate::pipeline::normalize::ProcessedImage;
use async_trait::async_trait;
use image::ImageFormat;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[async_trait]
pub trait Upscaler: Send + Sync {
    async fn upscale(&self, image: &ProcessedImage, name: &str)
        -> Result<ProcessedImage, ExtractError>;
}

/// Run `upscaler`, keeping `image` unchanged if it fails.
pub async fn upscale_or_keep(
    upscaler: &dyn Upscaler,
    image: ProcessedImage,
    name: &str,
) -> ProcessedImage {
    match upscaler.upscale(&image, name).await {
        Ok(upscaled) => upscaled,
        Err(e) => {
            warn!("{}: upscale failed, keeping original image: {}", name, e);
            image
        }
    }
}

/// A scratch copy of an image on disk, removed on drop.
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    pub fn create(image: &ProcessedImage) -> Result<Self, ExtractError> {
        let mut file = tempfile::Builder::new()
            .prefix("drawspec-")
            .suffix(&format!(".{}", image.extension()))
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("Failed to create scratch file: {e}")))?;
        file.write_all(&image.bytes)
            .and_then(|_| file.flush())
            .map_err(|e| ExtractError::Internal(format!("Failed to write scratch file: {e}")))?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// [`Upscaler`] that posts the staged file to an HTTP endpoint and expects image bytes back.
#[derive(Clone)]
pub struct HttpUpscaler {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpUpscaler {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Upscaler for HttpUpscaler {
    async fn upscale(
        &self,
        image: &ProcessedImage,
        name: &str,
    ) -> Result<ProcessedImage, ExtractError> {
        let scratch = ScratchFile::create(image)?;
        debug!("{}: staged upscale input at {}", name, scratch.path().display());

        let staged = tokio::fs::File::open(scratch.path())
            .await
            .map_err(|e| ExtractError::Internal(format!("Failed to open scratch file: {e}")))?;
        let length = staged
            .metadata()
            .await
            .map_err(|e| ExtractError::Internal(format!("Failed to stat scratch file: {e}")))?
            .len();
        let file_name = scratch
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("drawing.{}", image.extension()));
        // The body streams from disk; `scratch` must outlive the request.
        let part = Part::stream_with_length(Body::from(staged), length)
            .file_name(file_name)
            .mime_str(image.mime_type())
            .map_err(|e| ExtractError::Internal(e.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(Form::new().part("image", part))
            .send()
            .await
            .map_err(|e| ExtractError::Internal(format!("upscale request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ExtractError::Internal(format!(
                "upscale service returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractError::Internal(format!("upscale body unreadable: {e}")))?
            .to_vec();

        upscaled_image(bytes)
    }
}

fn upscaled_image(bytes: Vec<u8>) -> Result<ProcessedImage, ExtractError> {
    match image::guess_format(&bytes) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(ProcessedImage::new(bytes, format)),
        _ => Err(ExtractError::ImageDecode(
            "upscale service did not return a PNG or JPEG".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Failing {
        staged: std::sync::Mutex<Option<std::path::PathBuf>>,
    }

    #[async_trait]
    impl Upscaler for Failing {
        async fn upscale(
            &self,
            image: &ProcessedImage,
            _name: &str,
        ) -> Result<ProcessedImage, ExtractError> {
            let scratch = ScratchFile::create(image)?;
            assert!(scratch.path().exists());
            *self.staged.lock().unwrap() = Some(scratch.path().to_path_buf());
            Err(ExtractError::Internal("service unavailable".into()))
        }
    }

    #[test]
    fn scratch_file_is_removed_on_drop() {
        let image = ProcessedImage::new(vec![1, 2, 3], ImageFormat::Png);
        let scratch = ScratchFile::create(&image).unwrap();
        let path = scratch.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failure_keeps_input_and_removes_scratch() {
        let image = ProcessedImage::new(vec![9, 9], ImageFormat::Jpeg);
        let upscaler = Failing::default();
        let out = upscale_or_keep(&upscaler, image.clone(), "a.pdf").await;
        assert_eq!(out, image);
        let staged = upscaler.staged.lock().unwrap().clone().unwrap();
        assert!(!staged.exists());
    }

    /// One-shot HTTP endpoint: returns the raw request once `reply` is sent.
    async fn serve_once(reply: Vec<u8>) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/upscale", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok());
                let complete = match length {
                    Some(length) => request.len() >= end + 4 + length,
                    None => request.ends_with(b"0\r\n\r\n"),
                };
                if complete {
                    break;
                }
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&reply).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (url, handle)
    }

    #[tokio::test]
    async fn http_upscaler_streams_staged_file() {
        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let (url, server) = serve_once(png.clone()).await;

        let input = ProcessedImage::new(b"staged-jpeg-bytes".to_vec(), ImageFormat::Jpeg);
        let upscaler = HttpUpscaler::new(url, Duration::from_secs(5));
        let out = upscaler.upscale(&input, "cyl.pdf").await.unwrap();
        assert_eq!(out, ProcessedImage::new(png, ImageFormat::Png));

        let request = String::from_utf8_lossy(&server.await.unwrap()).into_owned();
        assert!(request.starts_with("POST /upscale"));
        assert!(request.contains("name=\"image\""));
        assert!(request.contains("filename=\"drawspec-"));
        assert!(request.contains("staged-jpeg-bytes"));
    }

    #[test]
    fn rejects_non_image_response() {
        assert!(upscaled_image(b"<html>".to_vec()).is_err());
    }
}
