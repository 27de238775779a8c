//! OpenAI REST client.
//!
//! One client serves the completion, transcription and image capabilities.
//! Any server that implements the same REST surface can be targeted by
//! overriding the base URL.

use crate::backend::{
    AudioClip, Completion, CompletionProvider, CompletionRequest, ImageProvider, LlmMessage,
    TokenUsage, Transcript, TranscriptionProvider,
};
use crate::error::{Capability, ProviderError};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default speech-to-text model.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Client for the OpenAI (or OpenAI-compatible) REST API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("transcription_model", &self.transcription_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Creates a client against the public OpenAI API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client against an OpenAI-compatible server.
    #[must_use]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
        }
    }

    /// Overrides the transcription model.
    #[must_use]
    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = model.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post_json<B, R>(&self, capability: Capability, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::RequestFailed {
                capability,
                reason: err.to_string(),
            })?;
        read_response(capability, response).await
    }
}

async fn read_response<R: DeserializeOwned>(
    capability: Capability,
    response: Response,
) -> Result<R, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers().get("retry-after"));
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        return Err(map_http_error(capability, status, &body, retry_after));
    }

    response
        .json()
        .await
        .map_err(|err| ProviderError::InvalidResponse {
            capability,
            reason: err.to_string(),
        })
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    #[instrument(skip(self, request), fields(model = %request.model, history = request.history.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: request.messages(),
            temperature: request.temperature,
        };
        let response: ChatCompletionResponse = self
            .post_json(Capability::Completion, "chat/completions", &body)
            .await?;
        let completion = response.into_completion(&request.model);
        debug!(tokens = completion.usage.total(), "completion received");
        Ok(completion)
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiClient {
    #[instrument(skip(self, clip), fields(format = clip.format.extension(), duration = clip.duration_seconds))]
    async fn transcribe(&self, clip: AudioClip<'_>) -> Result<Transcript, ProviderError> {
        let capability = Capability::Transcription;
        let bytes = tokio::fs::read(clip.path)
            .await
            .map_err(|err| ProviderError::RequestFailed {
                capability,
                reason: format!("failed to read staged audio: {err}"),
            })?;
        let file = Part::bytes(bytes)
            .file_name(format!("audio.{}", clip.format.extension()))
            .mime_str(clip.format.mime_type())
            .map_err(|err| ProviderError::RequestFailed {
                capability,
                reason: err.to_string(),
            })?;
        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", file);

        let response = self
            .http
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ProviderError::RequestFailed {
                capability,
                reason: err.to_string(),
            })?;
        let transcription: TranscriptionResponse = read_response(capability, response).await?;
        Ok(Transcript {
            text: transcription.text.trim().to_string(),
        })
    }
}

#[async_trait]
impl ImageProvider for OpenAiClient {
    #[instrument(skip(self, prompt))]
    async fn generate(&self, prompt: &str, size: &str) -> Result<String, ProviderError> {
        let body = ImageRequest { prompt, n: 1, size };
        let response: ImageResponse = self
            .post_json(Capability::ImageGeneration, "images/generations", &body)
            .await?;
        response
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or(ProviderError::EmptyResponse {
                capability: Capability::ImageGeneration,
            })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<LlmMessage>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
    #[serde(default)]
    model: Option<String>,
}

impl ChatCompletionResponse {
    fn into_completion(self, requested_model: &str) -> Completion {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty());
        let usage = self
            .usage
            .map(|usage| TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default();
        Completion {
            content,
            usage,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn map_http_error(
    capability: Capability,
    status: StatusCode,
    body: &str,
    retry_after_secs: Option<u64>,
) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            capability,
            retry_after_secs,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ProviderError::Rejected {
            capability,
            reason: message,
        },
        _ => ProviderError::RequestFailed {
            capability,
            reason: format!("HTTP {}: {message}", status.as_u16()),
        },
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<u64> {
    header?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioFormat, LlmRole};
    use axum::Json;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Uri};
    use axum::routing::post;
    use serde_json::{Value as JsonValue, json};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Recorded {
        path: String,
        authorization: Option<String>,
        body: String,
    }

    type Calls = Arc<Mutex<Vec<Recorded>>>;

    /// Serves a fake API and returns its root URL. Requests under `/v1` are
    /// recorded and answered; `/limited` answers every call with 429.
    async fn fake_openai(calls: Calls) -> String {
        let answer = |reply: JsonValue| {
            let calls = calls.clone();
            move |uri: Uri, headers: HeaderMap, body: Bytes| {
                let calls = calls.clone();
                let reply = reply.clone();
                async move {
                    calls.lock().unwrap().push(Recorded {
                        path: uri.path().to_string(),
                        authorization: headers
                            .get("authorization")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string),
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                    Json(reply)
                }
            }
        };
        let app = axum::Router::new()
            .route(
                "/v1/chat/completions",
                post(answer(json!({
                    "model": "gpt-4-0613",
                    "choices": [{"message": {"role": "assistant", "content": "Hi Ada"}}],
                    "usage": {"prompt_tokens": 20, "completion_tokens": 4}
                }))),
            )
            .route(
                "/v1/audio/transcriptions",
                post(answer(json!({"text": "  turn the lights off \n"}))),
            )
            .route(
                "/v1/images/generations",
                post(answer(json!({"data": [{"url": "https://images.example/fox.png"}]}))),
            )
            .route(
                "/limited/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "20")], "{}") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn chat_request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are chatting with Ada.".to_string(),
            history: vec![LlmMessage::new(LlmRole::User, "hello")],
            model: "gpt-4".to_string(),
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn complete_posts_chat_completions() {
        let calls: Calls = Arc::default();
        let root = fake_openai(calls.clone()).await;
        let client = OpenAiClient::with_base_url("sk-test", format!("{root}/v1"));

        let completion = client.complete(&chat_request()).await.unwrap();

        assert_eq!(completion.content.as_deref(), Some("Hi Ada"));
        assert_eq!(completion.usage.total(), 24);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/v1/chat/completions");
        assert_eq!(calls[0].authorization.as_deref(), Some("Bearer sk-test"));
        let body: JsonValue = serde_json::from_str(&calls[0].body).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn transcribe_uploads_model_and_file() {
        let calls: Calls = Arc::default();
        let root = fake_openai(calls.clone()).await;
        let client = OpenAiClient::with_base_url("sk-test", format!("{root}/v1"));
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.ogg");
        std::fs::write(&path, b"OggS fake audio").unwrap();

        let transcript = client
            .transcribe(AudioClip {
                path: &path,
                format: AudioFormat::Ogg,
                duration_seconds: 2,
            })
            .await
            .unwrap();

        assert_eq!(transcript.text, "turn the lights off");
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].path, "/v1/audio/transcriptions");
        assert_eq!(calls[0].authorization.as_deref(), Some("Bearer sk-test"));
        assert!(calls[0].body.contains(r#"name="model""#));
        assert!(calls[0].body.contains(DEFAULT_TRANSCRIPTION_MODEL));
        assert!(calls[0].body.contains(r#"name="file"; filename="audio.ogg""#));
        assert!(calls[0].body.contains("OggS fake audio"));
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_size() {
        let calls: Calls = Arc::default();
        let root = fake_openai(calls.clone()).await;
        let client = OpenAiClient::with_base_url("sk-test", format!("{root}/v1"));

        let url = client.generate("a red fox", "512x512").await.unwrap();

        assert_eq!(url, "https://images.example/fox.png");
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].path, "/v1/images/generations");
        assert_eq!(calls[0].authorization.as_deref(), Some("Bearer sk-test"));
        let body: JsonValue = serde_json::from_str(&calls[0].body).unwrap();
        assert_eq!(body["prompt"], "a red fox");
        assert_eq!(body["size"], "512x512");
        assert_eq!(body["n"], 1);
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let root = fake_openai(Arc::default()).await;
        let client = OpenAiClient::with_base_url("sk-test", format!("{root}/limited"));

        let err = client.complete(&chat_request()).await.unwrap_err();

        assert_eq!(
            err,
            ProviderError::RateLimited {
                capability: Capability::Completion,
                retry_after_secs: Some(20),
            }
        );
    }

    #[test]
    fn completion_request_body_shape() {
        let body = ChatCompletionRequest {
            model: "gpt-4",
            messages: vec![
                LlmMessage::new(LlmRole::System, "sys"),
                LlmMessage::new(LlmRole::User, "hi"),
            ],
            temperature: 0.3,
        };

        let json = serde_json::to_value(&body).expect("serialize");

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["temperature"], 0.3);
    }

    #[test]
    fn completion_response_parses_usage() {
        let raw = r#"{
            "model": "gpt-4-0613",
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");

        let completion = response.into_completion("gpt-4");

        assert_eq!(completion.content.as_deref(), Some("Hello!"));
        assert_eq!(completion.usage.total(), 15);
        assert_eq!(completion.model, "gpt-4-0613");
    }

    #[test]
    fn completion_without_content_keeps_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": null}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 0}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");

        let completion = response.into_completion("gpt-3.5-turbo");

        assert!(completion.content.is_none());
        assert_eq!(completion.usage.total(), 40);
        assert_eq!(completion.model, "gpt-3.5-turbo");
    }

    #[test]
    fn rate_limit_maps_retry_after() {
        let retry = parse_retry_after(Some(&HeaderValue::from_static("7")));
        let err = map_http_error(
            Capability::Completion,
            StatusCode::TOO_MANY_REQUESTS,
            "{}",
            retry,
        );
        assert_eq!(
            err,
            ProviderError::RateLimited {
                capability: Capability::Completion,
                retry_after_secs: Some(7),
            }
        );
    }

    #[test]
    fn bad_request_is_rejection_with_provider_message() {
        let body = r#"{"error": {"message": "Your request was rejected by our safety system", "type": "invalid_request_error"}}"#;
        let err = map_http_error(Capability::ImageGeneration, StatusCode::BAD_REQUEST, body, None);

        match err {
            ProviderError::Rejected { capability, reason } => {
                assert_eq!(capability, Capability::ImageGeneration);
                assert!(reason.contains("safety system"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn server_error_keeps_raw_body() {
        let err = map_http_error(
            Capability::Transcription,
            StatusCode::BAD_GATEWAY,
            "upstream down",
            None,
        );
        assert!(err.to_string().contains("HTTP 502: upstream down"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = OpenAiClient::with_base_url("key", "http://localhost:8000/v1/");
        assert_eq!(client.endpoint("chat/completions"), "http://localhost:8000/v1/chat/completions");
    }

    #[tokio::test]
    async fn transcribe_reports_unreadable_clip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.ogg");
        let client = OpenAiClient::new("key");

        let err = client
            .transcribe(AudioClip {
                path: &missing,
                format: AudioFormat::Ogg,
                duration_seconds: 3,
            })
            .await
            .unwrap_err();

        assert_eq!(err.capability(), Capability::Transcription);
        assert!(err.to_string().contains("staged audio"));
    }
}
