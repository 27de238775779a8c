//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SessionError`: Errors from session store operations

use relaybot_core::ConversationId;
use std::fmt;

/// Errors from session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session not found.
    NotFound { id: ConversationId },
    /// A session already exists for this conversation.
    AlreadyExists { id: ConversationId },
    /// Storage operation failed.
    StorageFailed { reason: String },
    /// A persisted record could not be decoded.
    Corrupt { id: ConversationId, reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "session not found: {id}"),
            Self::AlreadyExists { id } => write!(f, "session already exists: {id}"),
            Self::StorageFailed { reason } => {
                write!(f, "session storage failed: {reason}")
            }
            Self::Corrupt { id, reason } => {
                write!(f, "stored session {id} is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}
