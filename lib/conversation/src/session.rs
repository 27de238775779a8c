//! Conversation sessions.
//!
//! A session holds everything relaybot remembers about one conversation:
//! the bounded message context, the usage counters and the options.

use crate::ledger::UsageCounters;
use crate::message::Message;
use chrono::{DateTime, Utc};
use relaybot_core::ConversationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resolution requested from the image provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ImageResolution {
    /// 256x256 pixels.
    #[serde(rename = "256x256")]
    Small,
    /// 512x512 pixels.
    #[default]
    #[serde(rename = "512x512")]
    Medium,
    /// 1024x1024 pixels.
    #[serde(rename = "1024x1024")]
    Large,
}

impl ImageResolution {
    /// Returns the `WIDTHxHEIGHT` form providers expect.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "256x256",
            Self::Medium => "512x512",
            Self::Large => "1024x1024",
        }
    }

    /// Returns the next larger resolution, saturating at `Large`.
    #[must_use]
    pub const fn larger(self) -> Self {
        match self {
            Self::Small => Self::Medium,
            Self::Medium | Self::Large => Self::Large,
        }
    }

    /// Returns the next smaller resolution, saturating at `Small`.
    #[must_use]
    pub const fn smaller(self) -> Self {
        match self {
            Self::Large => Self::Medium,
            Self::Medium | Self::Small => Self::Small,
        }
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "256x256" => Ok(Self::Small),
            "512x512" => Ok(Self::Medium),
            "1024x1024" => Ok(Self::Large),
            other => Err(format!("unknown image resolution: {other}")),
        }
    }
}

/// Per-session configuration.
///
/// Bounded fields are only changed through
/// [`OptionsController`](crate::options::OptionsController), which clamps
/// every mutation to the field's domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Sampling temperature, in `[0.0, 1.0]` with a step of 0.1.
    pub temperature: f64,
    /// Maximum number of messages kept in context, in `[1, ceiling]`.
    pub max_context: usize,
    /// Resolution used for generated images.
    pub image_resolution: ImageResolution,
    /// Whether a transcribed voice message is also sent to the completion provider.
    pub relay_transcripts: bool,
    /// Whether assistant replies are also synthesized to voice.
    pub synthesize_voice: bool,
    /// Model used for completions in this conversation.
    pub active_model: String,
}

/// A conversation session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: ConversationId,
    context: Vec<Message>,
    usage: UsageCounters,
    options: SessionOptions,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty session for a conversation with the given default options.
    #[must_use]
    pub fn new(id: ConversationId, options: SessionOptions) -> Self {
        let now = Utc::now();
        Self {
            id,
            context: Vec::new(),
            usage: UsageCounters::default(),
            options,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a session from its persisted parts.
    #[must_use]
    pub fn restore(
        id: ConversationId,
        context: Vec<Message>,
        usage: UsageCounters,
        options: SessionOptions,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            context,
            usage,
            options,
            created_at,
            updated_at,
        }
    }

    /// Returns the conversation this session belongs to.
    #[must_use]
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Returns the context messages, oldest first.
    #[must_use]
    pub fn context(&self) -> &[Message] {
        &self.context
    }

    /// Returns the session options.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Returns the usage counters.
    #[must_use]
    pub fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session was last mutated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn context_mut(&mut self) -> &mut Vec<Message> {
        self.updated_at = Utc::now();
        &mut self.context
    }

    pub(crate) fn options_mut(&mut self) -> &mut SessionOptions {
        self.updated_at = Utc::now();
        &mut self.options
    }

    pub(crate) fn usage_mut(&mut self) -> &mut UsageCounters {
        self.updated_at = Utc::now();
        &mut self.usage
    }
}
