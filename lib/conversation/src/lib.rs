//! Conversation state for relaybot.
//!
//! This crate provides:
//!
//! - **Session Store**: durable mapping from conversation to session record
//! - **Context Manager**: bounded, strictly FIFO message history
//! - **Usage Ledger**: metered consumption and cost reports
//! - **Options Controller**: clamped mutation of per-session settings

pub mod context;
pub mod error;
pub mod ledger;
pub mod message;
pub mod options;
pub mod session;
pub mod store;

pub use error::SessionError;
pub use ledger::{PriceTable, UsageCounters, UsageKind, UsageLedger, UsageReport, UsageStatement};
pub use message::{Message, MessageRole};
pub use options::{OptionsController, SettingAction, SettingOutcome};
pub use session::{ImageResolution, Session, SessionOptions};
pub use store::{MemorySessionStore, SessionStore};
