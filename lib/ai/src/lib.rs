//! Generative-AI collaborators for relaybot.
//!
//! This crate defines the capabilities the bot needs from an AI provider:
//!
//! - **Completion**: chat completion over a bounded message history
//! - **Transcription**: speech to text for voice and audio attachments
//! - **Image generation**: prompt to image URL
//! - **Voice synthesis**: text to speech for assistant replies
//!
//! Concrete clients are selected once at startup through [`ProviderKind`]
//! and handed to the dispatcher as a [`Providers`] capability set.

pub mod backend;
pub mod error;
pub mod openai;
pub mod provider;
pub mod tts;

pub use backend::{
    AudioClip, AudioFormat, Completion, CompletionProvider, CompletionRequest, ImageProvider,
    LlmMessage, LlmRole, TokenUsage, Transcript, TranscriptionProvider, VoiceSynthesisProvider,
};
pub use error::{Capability, ProviderError};
pub use openai::OpenAiClient;
pub use provider::{ProviderKind, ProviderSettings, Providers};
pub use tts::GoogleTranslateTts;
