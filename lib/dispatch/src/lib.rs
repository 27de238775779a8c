//! Inbound event routing for relaybot.
//!
//! The [`Router`] classifies each inbound event, checks access, and applies
//! the matching session transition: context append, settings change, or a
//! provider call whose usage is recorded on the session. Each event runs
//! under a per-conversation lock so a session's read-modify-write never
//! interleaves with another event for the same conversation.

pub mod config;
pub mod error;
pub mod event;
pub mod locks;
pub mod menu;
pub mod router;
pub mod scratch;
pub mod transport;

pub use config::RouterConfig;
pub use error::DispatchError;
pub use event::{Attachment, AttachmentKind, Command, EventKind, InboundEvent, Origin};
pub use locks::SessionLocks;
pub use menu::{MenuButton, SettingsMenu};
pub use router::{Outbound, Router};
pub use scratch::AudioScratch;
pub use transport::{Transport, TransportError};
