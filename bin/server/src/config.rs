//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`TELEGRAM__TOKEN`, `BOT__ALLOWED_USERS`) and `;`
//! separating list entries.

use relaybot_access::AllowList;
use relaybot_ai::ProviderSettings;
use relaybot_conversation::PriceTable;
use relaybot_dispatch::RouterConfig;
use serde::{Deserialize, Deserializer};

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// SQLite connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Address the webhook listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Telegram Bot API settings.
    pub telegram: TelegramConfig,

    /// Conversation behavior.
    #[serde(default)]
    pub bot: BotConfig,

    /// AI provider settings.
    pub provider: ProviderSettings,

    /// Unit prices for usage reports.
    #[serde(default)]
    pub prices: PriceTable,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,

    /// Shared secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`.
    /// Unchecked when absent.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// Conversation behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// `;`-separated conversation ids, `*` admits everyone.
    #[serde(default, deserialize_with = "allow_list_from_str")]
    pub allowed_users: AllowList,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    /// Ceiling for a session's context length.
    #[serde(default = "default_max_context")]
    pub max_context: usize,

    #[serde(default = "default_relay_transcripts")]
    pub relay_transcripts: bool,

    /// Whether new sessions answer voice with synthesized speech.
    #[serde(default)]
    pub synthesize_voice: bool,

    /// Language code for synthesized voice replies.
    #[serde(default = "default_voice_language")]
    pub voice_language: String,
}

fn default_database_url() -> String {
    "sqlite://relaybot.db?mode=rwc".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_system_prompt() -> String {
    RouterConfig::default().system_prompt
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_context() -> usize {
    10
}

fn default_relay_transcripts() -> bool {
    true
}

fn default_voice_language() -> String {
    "en".to_string()
}

// A single numeric id arrives as an integer once `try_parsing` is on, so the
// list is read as one string and split here.
fn allow_list_from_str<'de, D>(deserializer: D) -> Result<AllowList, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(AllowList::parse(&raw))
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            allowed_users: AllowList::default(),
            system_prompt: default_system_prompt(),
            default_temperature: default_temperature(),
            max_context: default_max_context(),
            relay_transcripts: default_relay_transcripts(),
            synthesize_voice: false,
            voice_language: default_voice_language(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(None)
    }

    /// Loads configuration from `vars` instead of the process environment
    /// when given.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_source(
        vars: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(";")
                    .with_list_parse_key("provider.chat_models")
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }

    /// The slice of configuration the router needs.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            system_prompt: self.bot.system_prompt.clone(),
            models: self.provider.chat_models.clone(),
            context_ceiling: self.bot.max_context,
            default_temperature: self.bot.default_temperature,
            relay_transcripts: self.bot.relay_transcripts,
            synthesize_voice: self.bot.synthesize_voice,
            prices: self.prices,
            voice_language: self.bot.voice_language.clone(),
        }
    }
}
