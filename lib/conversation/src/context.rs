//! Bounded conversation context.
//!
//! The context window is what gets sent to a token-priced completion
//! provider, so it is kept to at most `options.max_context` messages.
//! Eviction is strict FIFO: the oldest messages go first, and the retained
//! messages are always the most recently appended ones in their original
//! order.
//!
//! These are pure in-memory transforms; the caller persists the session.

use crate::message::{Message, MessageRole};
use crate::session::Session;

/// Appends a message and evicts from the front until the context fits.
///
/// Returns the number of evicted messages.
pub fn append_message(session: &mut Session, role: MessageRole, content: impl Into<String>) -> usize {
    let limit = session.options().max_context.max(1);
    let context = session.context_mut();
    context.push(Message::new(role, content));
    let overflow = context.len().saturating_sub(limit);
    if overflow > 0 {
        context.drain(..overflow);
    }
    overflow
}

/// Trims the context to the current bound without appending.
///
/// Used after `max_context` shrinks so the invariant holds before the next
/// request goes out.
pub fn enforce_bound(session: &mut Session) -> usize {
    let limit = session.options().max_context.max(1);
    let overflow = session.context().len().saturating_sub(limit);
    if overflow > 0 {
        session.context_mut().drain(..overflow);
    }
    overflow
}

/// Empties the context, leaving usage and options untouched.
pub fn clear(session: &mut Session) {
    session.context_mut().clear();
}
