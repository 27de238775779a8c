//! Inbound event model.
//!
//! The transport translates platform updates into [`InboundEvent`]s; the
//! router only ever sees this shape.

use relaybot_ai::AudioFormat;
use relaybot_core::{ConversationId, EventId};
use serde::{Deserialize, Serialize};

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// The conversation the event belongs to.
    pub conversation_id: ConversationId,
    /// Name of the person who sent the event, for prompts and reports.
    pub display_name: String,
    /// Whether this is a one-to-one conversation with the bot.
    pub private: bool,
}

/// A classified inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Correlation id for logs.
    pub event_id: EventId,
    /// Sender and conversation.
    pub origin: Origin,
    /// What happened.
    pub kind: EventKind,
}

impl InboundEvent {
    /// Creates an event with a fresh id.
    #[must_use]
    pub fn new(origin: Origin, kind: EventKind) -> Self {
        Self {
            event_id: EventId::new(),
            origin,
            kind,
        }
    }

    /// The conversation the event belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.origin.conversation_id
    }
}

/// The kinds of inbound events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Plain text that is not a command.
    Text {
        /// The message text.
        text: String,
    },
    /// A slash command.
    Command(Command),
    /// A media attachment.
    Attachment(Attachment),
    /// A press on a settings menu button.
    SettingsCallback {
        /// Platform id used to acknowledge the press.
        callback_id: String,
        /// The button's payload, e.g. `/setting_inc_temp`.
        payload: String,
    },
}

impl EventKind {
    /// Classifies message text as a command or plain text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match Command::parse(&text) {
            Some(command) => Self::Command(command),
            None => Self::Text { text },
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Command(_) => "command",
            Self::Attachment(_) => "attachment",
            Self::SettingsCallback { .. } => "settings_callback",
        }
    }
}

/// Recognised commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Start,
    Clear,
    /// Cycle to the next configured model.
    Switch,
    /// Select a model directly (`/gpt3`, `/gpt4`).
    UseModel {
        model: String,
    },
    /// Open the settings menu.
    Settings,
    /// Show the current settings without the menu.
    Config,
    /// Generate an image from the prompt.
    Imagine {
        prompt: String,
    },
    Usage,
    Help,
    /// Anything else starting with `/`.
    Unknown {
        name: String,
    },
}

impl Command {
    /// Parses `/name[@bot] [args]`. Returns `None` for text that is not a
    /// command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(head, args)| (head, args.trim()));
        let name = head.split_once('@').map_or(head, |(name, _)| name);

        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "clear" => Self::Clear,
            "switch" => Self::Switch,
            "gpt3" => Self::UseModel {
                model: "gpt-3.5-turbo".to_string(),
            },
            "gpt4" => Self::UseModel {
                model: "gpt-4".to_string(),
            },
            "settings" => Self::Settings,
            "config" => Self::Config,
            "imagine" => Self::Imagine {
                prompt: args.to_string(),
            },
            "usage" => Self::Usage,
            "help" => Self::Help,
            _ => Self::Unknown {
                name: name.to_string(),
            },
        })
    }

    /// Command name for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Clear => "clear",
            Self::Switch => "switch",
            Self::UseModel { .. } => "use_model",
            Self::Settings => "settings",
            Self::Config => "config",
            Self::Imagine { .. } => "imagine",
            Self::Usage => "usage",
            Self::Help => "help",
            Self::Unknown { name } => name,
        }
    }
}

/// Media attachment kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// A recorded voice message.
    Voice,
    /// A video or video note.
    Video,
    /// An audio file.
    Audio,
    /// Photos, documents and anything else.
    Other,
}

impl AttachmentKind {
    /// Container format to transcribe, or `None` if the kind is unsupported.
    #[must_use]
    pub const fn format(&self) -> Option<AudioFormat> {
        match self {
            Self::Voice => Some(AudioFormat::Ogg),
            Self::Video => Some(AudioFormat::Mp4),
            Self::Audio => Some(AudioFormat::Mp3),
            Self::Other => None,
        }
    }

    /// Whether the attachment is speech addressed to the bot.
    #[must_use]
    pub const fn is_spoken(&self) -> bool {
        matches!(self, Self::Voice)
    }
}

/// A media attachment reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Platform file reference, resolved through [`Transport::download`](crate::Transport::download).
    pub file_id: String,
    /// Duration reported by the platform.
    pub duration_seconds: u64,
}
