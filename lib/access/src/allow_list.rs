//! Allow-list of authorized conversation identities.

use crate::error::AccessError;
use relaybot_core::ConversationId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Entry that authorizes every identity.
pub const WILDCARD: &str = "*";

/// The set of identities allowed to talk to the bot.
///
/// An empty list denies everyone. A list containing [`WILDCARD`] admits
/// everyone regardless of the other entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AllowList {
    entries: HashSet<String>,
    universal: bool,
}

impl AllowList {
    /// Builds an allow-list from individual entries. Blank entries are
    /// skipped and surrounding whitespace is ignored.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: HashSet<String> = entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        let universal = entries.contains(WILDCARD);
        Self { entries, universal }
    }

    /// Parses a `;`-separated list such as `123;456` or `*`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::from_entries(raw.split(';'))
    }

    /// An allow-list admitting everyone.
    #[must_use]
    pub fn everyone() -> Self {
        Self::from_entries([WILDCARD])
    }

    /// Returns true if the list contains the universal wildcard.
    #[must_use]
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    /// Returns true if `identity` may interact with the bot.
    #[must_use]
    pub fn permits(&self, identity: &ConversationId) -> bool {
        self.universal || self.entries.contains(identity.as_str())
    }

    /// Checks `identity`, failing with [`AccessError::Denied`] if refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is not on the list.
    pub fn require(&self, identity: &ConversationId) -> Result<(), Report<AccessError>> {
        if self.permits(identity) {
            debug!(%identity, "access granted");
            return Ok(());
        }
        warn!(%identity, "access denied");
        Err(AccessError::Denied {
            identity: identity.to_string(),
        }
        .into())
    }
}

impl From<Vec<String>> for AllowList {
    fn from(entries: Vec<String>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<AllowList> for Vec<String> {
    fn from(list: AllowList) -> Self {
        let mut entries: Vec<String> = list.entries.into_iter().collect();
        entries.sort();
        entries
    }
}
