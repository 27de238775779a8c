//! Error types for the AI crate.
//!
//! Provider errors are rendered back to the user, so every variant names the
//! capability that failed.

use std::fmt;

/// A capability offered by an AI provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Chat completion.
    Completion,
    /// Speech to text.
    Transcription,
    /// Image generation.
    ImageGeneration,
    /// Text to speech.
    VoiceSynthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => f.write_str("chat completion"),
            Self::Transcription => f.write_str("transcription"),
            Self::ImageGeneration => f.write_str("image generation"),
            Self::VoiceSynthesis => f.write_str("voice synthesis"),
        }
    }
}

/// Errors from provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request could not be sent or the provider answered with a failure.
    RequestFailed {
        capability: Capability,
        reason: String,
    },
    /// Rate limit exceeded.
    RateLimited {
        capability: Capability,
        retry_after_secs: Option<u64>,
    },
    /// The provider refused the input (content policy, invalid prompt).
    Rejected {
        capability: Capability,
        reason: String,
    },
    /// Response parsing failed.
    InvalidResponse {
        capability: Capability,
        reason: String,
    },
    /// The provider answered but returned nothing usable.
    EmptyResponse { capability: Capability },
}

impl ProviderError {
    /// Returns the capability that failed.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::RequestFailed { capability, .. }
            | Self::RateLimited { capability, .. }
            | Self::Rejected { capability, .. }
            | Self::InvalidResponse { capability, .. }
            | Self::EmptyResponse { capability } => *capability,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { capability, reason } => {
                write!(f, "{capability} request failed: {reason}")
            }
            Self::RateLimited {
                capability,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{capability} rate limited, retry after {secs}s")
                } else {
                    write!(f, "{capability} rate limited")
                }
            }
            Self::Rejected { capability, reason } => {
                write!(f, "{capability} request rejected: {reason}")
            }
            Self::InvalidResponse { capability, reason } => {
                write!(f, "failed to parse {capability} response: {reason}")
            }
            Self::EmptyResponse { capability } => {
                write!(f, "{capability} returned nothing")
            }
        }
    }
}

impl std::error::Error for ProviderError {}
