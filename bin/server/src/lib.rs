//! relaybot webhook server.
//!
//! Wires the Telegram Bot API to the dispatch router: updates arrive on an
//! axum webhook, are queued per conversation, and sessions persist in SQLite.

pub mod config;
pub mod db;
pub mod queue;
pub mod telegram;
