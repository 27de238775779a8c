//! Messaging platform boundary.

use crate::menu::SettingsMenu;
use async_trait::async_trait;
use relaybot_core::ConversationId;

/// Outbound side of the messaging platform.
///
/// The router only talks to the platform through this trait so it can be
/// exercised without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a text reply.
    async fn send_text(&self, to: &ConversationId, text: &str) -> Result<(), TransportError>;

    /// Sends an audio clip as a voice message.
    async fn send_voice(&self, to: &ConversationId, audio: Vec<u8>) -> Result<(), TransportError>;

    /// Sends `text` with the settings menu attached.
    async fn send_settings_menu(
        &self,
        to: &ConversationId,
        text: &str,
        menu: &SettingsMenu,
    ) -> Result<(), TransportError>;

    /// Shows a typing indicator.
    async fn typing(&self, to: &ConversationId) -> Result<(), TransportError>;

    /// Acknowledges a menu button press.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;

    /// Downloads an attachment's bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, TransportError>;
}

/// Errors from transport operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The platform API call failed.
    RequestFailed { method: String, message: String },
    /// The platform answered with an error.
    Api { method: String, description: String },
    /// An attachment could not be fetched.
    DownloadFailed { file_id: String, message: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed { method, message } => {
                write!(f, "{method} request failed: {message}")
            }
            Self::Api {
                method,
                description,
            } => write!(f, "{method} rejected: {description}"),
            Self::DownloadFailed { file_id, message } => {
                write!(f, "download of {file_id} failed: {message}")
            }
        }
    }
}

impl std::error::Error for TransportError {}
