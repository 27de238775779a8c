//! Telegram Bot API plumbing.
//!
//! Updates arrive on the webhook, are converted into [`InboundEvent`]s and
//! queued; replies leave through [`TelegramTransport`].
//!
//! [`InboundEvent`]: relaybot_dispatch::InboundEvent

pub mod client;
pub mod types;
pub mod webhook;

pub use client::TelegramTransport;
pub use types::Update;
pub use webhook::{SECRET_HEADER, WebhookState, receive};
