//! One [`ConversationContext`] per session, behind a concurrent map.
//!
//! Sessions are created lazily on first access. Callers reach a context only
//! through a closure, so the shard lock is held for exactly one operation and
//! no session can observe another's state.

use dashmap::DashMap;

use crate::conversation::{ConversationConfig, ConversationContext, ConversationSummary};
use crate::summarize::Phrasing;

/// Concurrent session id → conversation context map.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, ConversationContext>,
    config: ConversationConfig,
    phrasing: Phrasing,
}

impl SessionRegistry {
    pub fn new(config: ConversationConfig, phrasing: Phrasing) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            phrasing,
        }
    }

    /// Run `f` against the session's context, creating it if needed.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut ConversationContext) -> R) -> R {
        let mut entry = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = id, "session started");
                ConversationContext::new(self.config, self.phrasing)
            });
        f(entry.value_mut())
    }

    /// Summary of an existing session, without creating one.
    pub fn summary(&self, id: &str) -> Option<ConversationSummary> {
        self.sessions.get(id).and_then(|ctx| ctx.summary())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Drop a session's state. Returns whether it existed.
    pub fn end(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::debug!(session = id, "session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
