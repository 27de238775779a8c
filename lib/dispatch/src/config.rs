//! Router configuration.

use relaybot_conversation::{ImageResolution, PriceTable, SessionOptions};
use serde::{Deserialize, Serialize};

/// Process-wide settings the router applies to every conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Base system prompt, prefixed with the sender's name per request.
    pub system_prompt: String,
    /// Chat models users can cycle through; the first is the default.
    pub models: Vec<String>,
    /// Upper bound for a session's context length, also its default.
    pub context_ceiling: usize,
    /// Temperature for new sessions.
    pub default_temperature: f64,
    /// Whether new sessions relay voice transcripts to the model.
    pub relay_transcripts: bool,
    /// Whether new sessions answer voice with synthesized speech.
    pub synthesize_voice: bool,
    /// Unit prices for usage reports.
    pub prices: PriceTable,
    /// Language code for voice synthesis.
    pub voice_language: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            models: vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()],
            context_ceiling: 10,
            default_temperature: 0.7,
            relay_transcripts: true,
            synthesize_voice: false,
            prices: PriceTable::default(),
            voice_language: "en".to_string(),
        }
    }
}

impl RouterConfig {
    /// Options given to a session on first contact.
    #[must_use]
    pub fn default_options(&self) -> SessionOptions {
        SessionOptions {
            temperature: self.default_temperature,
            max_context: self.context_ceiling.max(1),
            image_resolution: ImageResolution::default(),
            relay_transcripts: self.relay_transcripts,
            synthesize_voice: self.synthesize_voice,
            active_model: self.models.first().cloned().unwrap_or_default(),
        }
    }

    /// The system prompt sent for a conversation with `display_name`.
    #[must_use]
    pub fn system_prompt_for(&self, display_name: &str) -> String {
        format!("You are chatting with {display_name}. {}", self.system_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_start_at_first_model_and_ceiling() {
        let config = RouterConfig {
            context_ceiling: 6,
            ..RouterConfig::default()
        };

        let options = config.default_options();

        assert_eq!(options.active_model, "gpt-3.5-turbo");
        assert_eq!(options.max_context, 6);
        assert_eq!(options.image_resolution, ImageResolution::Medium);
        assert!(!options.synthesize_voice);
    }

    #[test]
    fn voice_default_comes_from_config() {
        let config = RouterConfig {
            synthesize_voice: true,
            ..RouterConfig::default()
        };

        assert!(config.default_options().synthesize_voice);
    }

    #[test]
    fn system_prompt_names_the_user() {
        let config = RouterConfig::default();
        assert_eq!(
            config.system_prompt_for("Ada"),
            "You are chatting with Ada. You are a helpful assistant."
        );
    }
}
