//! Voice synthesis through the public Google Translate speech endpoint.
//!
//! The endpoint accepts at most [`MAX_CHUNK_CHARS`] characters per request,
//! so longer replies are split at whitespace and the MP3 segments are
//! concatenated in order.

use crate::backend::VoiceSynthesisProvider;
use crate::error::{Capability, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

/// Default speech endpoint.
pub const DEFAULT_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Per-request character limit of the speech endpoint.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Speech synthesis client. Produces MP3 audio.
#[derive(Debug, Clone)]
pub struct GoogleTranslateTts {
    http: Client,
    endpoint: String,
}

impl Default for GoogleTranslateTts {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleTranslateTts {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_TTS_URL)
    }

    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn fetch_chunk(&self, chunk: &str, language: &str) -> Result<Vec<u8>, ProviderError> {
        let capability = Capability::VoiceSynthesis;
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("ie", "UTF-8"), ("q", chunk), ("tl", language), ("client", "tw-ob")])
            .send()
            .await
            .map_err(|err| ProviderError::RequestFailed {
                capability,
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                capability,
                retry_after_secs: None,
            });
        }
        if !status.is_success() {
            return Err(ProviderError::RequestFailed {
                capability,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProviderError::InvalidResponse {
                capability,
                reason: err.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl VoiceSynthesisProvider for GoogleTranslateTts {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ProviderError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(ProviderError::EmptyResponse {
                capability: Capability::VoiceSynthesis,
            });
        }

        let mut audio = Vec::new();
        for chunk in &chunks {
            audio.extend(self.fetch_chunk(chunk, language).await?);
        }
        debug!(chunks = chunks.len(), bytes = audio.len(), "speech synthesized");

        if audio.is_empty() {
            return Err(ProviderError::EmptyResponse {
                capability: Capability::VoiceSynthesis,
            });
        }
        Ok(audio)
    }
}

/// Splits `text` into chunks of at most `limit` characters, breaking at
/// whitespace where possible. Words longer than `limit` are hard-split.
fn split_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
