//! Vision oracle: the narrow interface to an external multimodal model.
//!
//! Every model call in the pipeline (orientation, extraction, validation)
//! goes through [`VisionOracle::infer`], which takes a fully described
//! request and returns the model's raw text content. Prompt construction
//! and response parsing stay with the calling stage, so a mock oracle only
//! has to return canned strings.
//!
//! [`OpenAiOracle`] speaks the OpenAI-compatible `chat/completions` protocol.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx and timeouts are transient. [`infer_with_retry`] backs off
//! exponentially (`retry_backoff_ms * 2^(attempt-1)`): with a 500 ms base and
//! two retries the waits are 500 ms then 1 s. Client errors (4xx other than
//! 429) and malformed envelopes are returned immediately.

use crate::config::ExtractionConfig;
use crate::error::OracleError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// How the image is attached to the user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Inline `data:<mime>;base64,...` URI.
    DataUri(String),
    /// Publicly resolvable URL.
    Url(String),
}

impl ImageRef {
    pub fn as_url(&self) -> &str {
        match self {
            ImageRef::DataUri(s) | ImageRef::Url(s) => s,
        }
    }
}

/// One fully specified oracle call.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Used only for log lines, e.g. `drawing.pdf/batch1`.
    pub label: String,
    pub model: String,
    pub system: String,
    pub user_text: String,
    pub image: ImageRef,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    /// Force a single JSON object response (`response_format: json_object`).
    pub json_mode: bool,
    pub timeout: Duration,
}

/// An external vision model.
#[async_trait]
pub trait VisionOracle: Send + Sync {
    /// Send `request` and return the assistant message content.
    async fn infer(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Call `oracle`, retrying transient failures with exponential backoff.
pub async fn infer_with_retry(
    oracle: &dyn VisionOracle,
    request: &OracleRequest,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<String, OracleError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let backoff = retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                request.label, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match oracle.infer(request).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_transient() && attempt < max_retries => {
                warn!("{}: attempt {} failed: {}", request.label, attempt + 1, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`VisionOracle`] for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiOracle {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, OracleError> {
        let client = Client::builder()
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, OracleError> {
        Self::new(&config.api_base_url, config.api_key.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VisionOracle for OpenAiOracle {
    async fn infer(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let api_key = self.api_key.as_deref().ok_or(OracleError::MissingApiKey)?;
        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.trim())
            .timeout(request.timeout)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| map_transport_error(e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(OracleError::Http {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &envelope.usage {
            debug!(
                "{}: {} input tokens, {} output tokens, {:?}",
                request.label,
                usage.prompt_tokens,
                usage.completion_tokens,
                start.elapsed()
            );
        }

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::EmptyContent)
    }
}

/// Build the `chat/completions` request body.
///
/// Layout: a system message, then one user message holding the instruction
/// text followed by the image part.
pub fn build_body(request: &OracleRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.system },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": request.user_text },
                    {
                        "type": "image_url",
                        "image_url": { "url": request.image.as_url(), "detail": "high" }
                    }
                ]
            }
        ]
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(max_tokens) = request.max_tokens {
            obj.insert("max_tokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            obj.insert("temperature".into(), json!(temperature));
        }
        if request.json_mode {
            obj.insert("response_format".into(), json!({ "type": "json_object" }));
        }
    }
    body
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        OracleError::Transport(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "…"
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(json_mode: bool) -> OracleRequest {
        OracleRequest {
            label: "test".into(),
            model: "gpt-4o".into(),
            system: "sys".into(),
            user_text: "look".into(),
            image: ImageRef::DataUri("data:image/jpeg;base64,AAAA".into()),
            max_tokens: Some(500),
            temperature: Some(0.0),
            json_mode,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn body_has_system_then_user_with_image() {
        let body = build_body(&request(true));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["text"], "look");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn body_omits_unset_options() {
        let mut req = request(false);
        req.max_tokens = None;
        req.temperature = None;
        req.image = ImageRef::Url("https://i.example/x.jpg".into());
        let body = build_body(&req);
        assert!(body.get("response_format").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "https://i.example/x.jpg"
        );
    }

    #[test]
    fn endpoint_joins_base_url() {
        let oracle = OpenAiOracle::new("https://api.example.com/v1/", None).unwrap();
        assert_eq!(oracle.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let oracle = OpenAiOracle::new("http://127.0.0.1:9", Some("  ".into())).unwrap();
        let err = oracle.infer(&request(true)).await.unwrap_err();
        assert_eq!(err, OracleError::MissingApiKey);
    }

    struct Scripted {
        calls: AtomicUsize,
        replies: Mutex<Vec<Result<String, OracleError>>>,
    }

    #[async_trait]
    impl VisionOracle for Scripted {
        async fn infer(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let oracle = Scripted {
            calls: AtomicUsize::new(0),
            replies: Mutex::new(vec![
                Err(OracleError::Http { status: 503, body: String::new() }),
                Ok("{}".into()),
            ]),
        };
        let out = infer_with_retry(&oracle, &request(false), 2, 1).await.unwrap();
        assert_eq!(out, "{}");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let oracle = Scripted {
            calls: AtomicUsize::new(0),
            replies: Mutex::new(vec![Err(OracleError::Http { status: 400, body: "bad".into() })]),
        };
        let err = infer_with_retry(&oracle, &request(false), 3, 1).await.unwrap_err();
        assert!(matches!(err, OracleError::Http { status: 400, .. }));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let oracle = Scripted {
            calls: AtomicUsize::new(0),
            replies: Mutex::new(vec![
                Err(OracleError::Timeout { secs: 1 }),
                Err(OracleError::Timeout { secs: 1 }),
                Err(OracleError::Timeout { secs: 1 }),
            ]),
        };
        let err = infer_with_retry(&oracle, &request(false), 2, 1).await.unwrap_err();
        assert_eq!(err, OracleError::Timeout { secs: 1 });
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }
}
