//! Provider selection.
//!
//! The provider kind is read from configuration once at startup and turned
//! into a [`Providers`] capability set. Nothing downstream branches on the
//! kind again.

use crate::backend::{
    CompletionProvider, ImageProvider, TranscriptionProvider, VoiceSynthesisProvider,
};
use crate::openai::{DEFAULT_BASE_URL, DEFAULT_TRANSCRIPTION_MODEL, OpenAiClient};
use crate::tts::GoogleTranslateTts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available provider families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// The public OpenAI API.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// A self-hosted server exposing the OpenAI REST surface.
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,
    pub api_key: String,
    /// Required for [`ProviderKind::OpenAiCompatible`]; ignored otherwise.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Chat models the user may cycle through, first is the default.
    #[serde(default = "default_chat_models")]
    pub chat_models: Vec<String>,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
}

fn default_chat_models() -> Vec<String> {
    vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()]
}

fn default_transcription_model() -> String {
    DEFAULT_TRANSCRIPTION_MODEL.to_string()
}

impl ProviderSettings {
    /// Returns the API root for the configured kind.
    #[must_use]
    pub fn resolved_base_url(&self) -> &str {
        match self.kind {
            ProviderKind::OpenAi => DEFAULT_BASE_URL,
            ProviderKind::OpenAiCompatible => {
                self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
            }
        }
    }
}

/// The capability set handed to the dispatcher.
#[derive(Clone)]
pub struct Providers {
    pub completion: Arc<dyn CompletionProvider>,
    pub transcription: Arc<dyn TranscriptionProvider>,
    pub images: Arc<dyn ImageProvider>,
    pub voice: Arc<dyn VoiceSynthesisProvider>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

impl Providers {
    /// Builds the capability set for the configured provider.
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let client = Arc::new(
            OpenAiClient::with_base_url(settings.api_key.clone(), settings.resolved_base_url())
                .with_transcription_model(settings.transcription_model.clone()),
        );
        Self {
            completion: client.clone(),
            transcription: client.clone(),
            images: client,
            voice: Arc::new(GoogleTranslateTts::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: ProviderKind, base_url: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            kind,
            api_key: "sk-test".to_string(),
            base_url: base_url.map(str::to_string),
            chat_models: default_chat_models(),
            transcription_model: default_transcription_model(),
        }
    }

    #[test]
    fn openai_ignores_base_url_override() {
        let settings = settings(ProviderKind::OpenAi, Some("http://localhost:1234/v1"));
        assert_eq!(settings.resolved_base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn compatible_uses_configured_base_url() {
        let settings = settings(ProviderKind::OpenAiCompatible, Some("http://localhost:1234/v1"));
        assert_eq!(settings.resolved_base_url(), "http://localhost:1234/v1");
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: ProviderSettings =
            serde_json::from_str(r#"{"kind": "openai_compatible", "api_key": "k"}"#)
                .expect("parse");

        assert_eq!(settings.kind, ProviderKind::OpenAiCompatible);
        assert_eq!(settings.chat_models, vec!["gpt-3.5-turbo", "gpt-4"]);
        assert_eq!(settings.transcription_model, "whisper-1");
    }

    #[test]
    fn builds_every_capability() {
        let providers = Providers::from_settings(&settings(ProviderKind::OpenAi, None));
        assert!(format!("{providers:?}").contains("Providers"));
    }
}
