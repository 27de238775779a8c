//! Provider capability traits.
//!
//! Each capability is its own trait so a deployment can mix providers and
//! tests can substitute doubles for any one of them.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    /// System message.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

/// A message sent to a completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// The role of the message sender.
    pub role: LlmRole,
    /// The content of the message.
    pub content: String,
}

impl LlmMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt, sent ahead of the history.
    pub system_prompt: String,
    /// Conversation history, oldest first.
    pub history: Vec<LlmMessage>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature (0.0 - 1.0).
    pub temperature: f64,
}

impl CompletionRequest {
    /// Returns the full message list: the system prompt followed by the history.
    #[must_use]
    pub fn messages(&self) -> Vec<LlmMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(LlmMessage::new(LlmRole::System, self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u64,
    /// Number of output tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A completion response.
///
/// `content` is `None` when the provider billed the request but produced no
/// text, so callers can still account for the tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The generated text, if any.
    pub content: Option<String>,
    /// Token usage reported by the provider.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
}

/// Container formats accepted for transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Ogg/Opus, used by voice messages.
    Ogg,
    /// MPEG audio.
    Mp3,
    /// MPEG-4 video or audio.
    Mp4,
}

impl AudioFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }

    /// MIME type for uploads.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
            Self::Mp4 => "video/mp4",
        }
    }
}

/// Audio staged on disk for transcription.
#[derive(Debug, Clone, Copy)]
pub struct AudioClip<'a> {
    /// Location of the staged audio.
    pub path: &'a Path,
    /// Container format.
    pub format: AudioFormat,
    /// Duration reported by the platform, in seconds.
    pub duration_seconds: u64,
}

/// A transcription result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// The recognised text; empty for silence.
    pub text: String,
}

/// Chat completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Completes a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Speech-to-text capability.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribes a staged audio clip.
    ///
    /// # Errors
    ///
    /// Returns an error if the clip cannot be read or the provider call fails.
    async fn transcribe(&self, clip: AudioClip<'_>) -> Result<Transcript, ProviderError>;
}

/// Image generation capability.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generates one image and returns its URL.
    ///
    /// `size` is `WIDTHxHEIGHT`, e.g. `512x512`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or rejects the prompt.
    async fn generate(&self, prompt: &str, size: &str) -> Result<String, ProviderError>;
}

/// Text-to-speech capability.
#[async_trait]
pub trait VoiceSynthesisProvider: Send + Sync {
    /// Synthesizes speech and returns encoded audio bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, ProviderError>;
}
