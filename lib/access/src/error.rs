//! Access error types.

use std::fmt;

/// Access control errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The originating identity is not on the allow-list.
    Denied {
        /// The identity that was refused.
        identity: String,
    },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied { identity } => write!(f, "access denied for '{identity}'"),
        }
    }
}

impl std::error::Error for AccessError {}
