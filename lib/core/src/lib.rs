//! Core types shared by every relaybot crate.
//!
//! This crate provides the identifier types used to key sessions and trace
//! inbound events, plus the rootcause-based `Result` alias.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, EventId, ParseIdError};
