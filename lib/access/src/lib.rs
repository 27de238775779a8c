//! Access control for relaybot.
//!
//! Every inbound event is checked against a configured allow-list before any
//! session state is read or written.

mod allow_list;
mod error;

pub use allow_list::{AllowList, WILDCARD};
pub use error::AccessError;
