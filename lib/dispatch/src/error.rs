//! Dispatch error types.

use relaybot_core::ConversationId;
use std::fmt;

/// Errors that abort handling of a single event.
///
/// Provider failures are not here: they are answered in chat and the event
/// still completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The session could not be loaded or saved.
    Storage {
        /// The affected conversation.
        conversation_id: ConversationId,
    },
    /// The messaging transport failed.
    Transport {
        /// Error details.
        reason: String,
    },
    /// Staging an attachment on disk failed.
    Scratch {
        /// Error details.
        reason: String,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { conversation_id } => {
                write!(f, "session storage failed for conversation {conversation_id}")
            }
            Self::Transport { reason } => write!(f, "transport failed: {reason}"),
            Self::Scratch { reason } => write!(f, "failed to stage attachment: {reason}"),
        }
    }
}

impl std::error::Error for DispatchError {}
