//! Generative model client and the retry policy wrapped around it.
//!
//! [`ModelClient`] is the seam: the orchestrator only sees `send(prompt)`.
//! [`GeminiClient`] speaks the `generateContent` REST shape. Failures are
//! classified once, as [`ArticleFixError::TransientService`] (retried) or
//! [`ArticleFixError::PermanentService`] (not retried).

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

use articlefix_shared::{ArticleFixError, ModelSettings, Result};

/// Send one prompt, receive the model's text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Exponential backoff with jitter, bounded by a total attempt count.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ModelSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            min_delay: settings.min_delay,
            max_delay: settings.max_delay,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// Send `prompt`, retrying transient failures under `policy`.
pub async fn send_with_retry(
    client: &dyn ModelClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String> {
    let attempt = || async { client.send(prompt).await };
    attempt
        .retry(policy.backoff())
        .sleep(sleep)
        .when(ArticleFixError::is_retryable)
        .notify(|err: &ArticleFixError, delay: Duration| {
            warn!(delay_ms = delay.as_millis(), error = %err, "retrying model request");
        })
        .await
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// Markers in an error body that indicate a retryable condition.
const TRANSIENT_MARKERS: [&str; 3] = ["429", "RESOURCE_EXHAUSTED", "UNAVAILABLE"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    url: Url,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(ArticleFixError::config("model API key is empty"));
        }
        let mut base = settings.endpoint.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let url = Url::parse(&base)
            .and_then(|b| b.join(&format!("models/{}:generateContent", settings.model)))
            .map_err(|e| ArticleFixError::config(format!("invalid model endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("ArticleFix/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ArticleFixError::config(format!("http client build: {e}")))?;

        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
        })
    }
}

/// Classify an HTTP failure by status and body.
fn classify(status: u16, body: &str) -> ArticleFixError {
    let message = body.chars().take(500).collect::<String>();
    let transient_status = status == 429 || (500..=599).contains(&status);
    if transient_status || TRANSIENT_MARKERS.iter().any(|m| body.contains(m)) {
        ArticleFixError::transient(Some(status), message)
    } else {
        ArticleFixError::permanent(Some(status), message)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn send(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .http
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ArticleFixError::transient(None, e.to_string())
                } else {
                    ArticleFixError::permanent(None, e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArticleFixError::transient(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(classify(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            ArticleFixError::permanent(Some(status.as_u16()), format!("malformed envelope: {e}"))
        })?;
        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            ArticleFixError::permanent(Some(status.as_u16()), "reply has no candidates")
        })?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ArticleFixError::permanent(
                Some(status.as_u16()),
                format!(
                    "empty reply (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            ));
        }
        debug!(len = text.len(), "model reply received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(endpoint: &str) -> ModelSettings {
        ModelSettings {
            api_key: "test-key".into(),
            model: "gemini-test".into(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            temperature: 0.3,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
    }

    /// Fails with the scripted errors in order, then succeeds.
    struct Flaky {
        errors: Mutex<Vec<ArticleFixError>>,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(mut errors: Vec<ArticleFixError>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Flaky {
        async fn send(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok("ok".into()),
            }
        }
    }

    #[tokio::test]
    async fn gemini_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("[{\"id\":\"a\"}]")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&settings(&format!("{}/v1beta", server.uri()))).unwrap();
        let text = client.send("prompt").await.expect("send");
        assert_eq!(text, "[{\"id\":\"a\"}]");
    }

    #[tokio::test]
    async fn gemini_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;
        let client = GeminiClient::new(&settings(&server.uri())).unwrap();
        let err = client.send("p").await.unwrap_err();
        assert!(err.is_retryable());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;
        let client = GeminiClient::new(&settings(&server.uri())).unwrap();
        let err = client.send("p").await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("(400)"));
    }

    #[tokio::test]
    async fn gemini_rejects_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
            )
            .mount(&server)
            .await;
        let client = GeminiClient::new(&settings(&server.uri())).unwrap();
        assert!(matches!(
            client.send("p").await.unwrap_err(),
            ArticleFixError::PermanentService { .. }
        ));
    }

    #[test]
    fn markers_in_body_mark_transient() {
        assert!(classify(400, "{\"status\": \"RESOURCE_EXHAUSTED\"}").is_retryable());
        assert!(classify(503, "").is_retryable());
        assert!(!classify(403, "forbidden").is_retryable());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut s = settings("https://example.com/");
        s.api_key = " ".into();
        assert!(GeminiClient::new(&s).is_err());
    }

    #[tokio::test]
    async fn transient_errors_retry_up_to_the_cap() {
        let client = Flaky::new(vec![
            ArticleFixError::transient(Some(429), "a"),
            ArticleFixError::transient(Some(503), "b"),
        ]);
        let text = send_with_retry(&client, "p", &fast_policy()).await.expect("third try");
        assert_eq!(text, "ok");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);

        let client = Flaky::new(vec![
            ArticleFixError::transient(Some(429), "a"),
            ArticleFixError::transient(Some(429), "b"),
            ArticleFixError::transient(Some(429), "c"),
        ]);
        assert!(send_with_retry(&client, "p", &fast_policy()).await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let client = Flaky::new(vec![ArticleFixError::permanent(Some(400), "bad")]);
        assert!(send_with_retry(&client, "p", &fast_policy()).await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("fine")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&settings(&server.uri())).unwrap();
        let text = send_with_retry(&client, "p", &fast_policy()).await.expect("retry");
        assert_eq!(text, "fine");
    }
}
