//! Database access for relaybot.
//!
//! Sessions live in a single SQLite table, one row per conversation.

pub mod session;

pub use session::SqliteSessionStore;
