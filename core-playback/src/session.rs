//! Playback session generations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generation captured when a renderer request is issued.
///
/// Renderer events carry the token back; an event whose token is no longer
/// current belongs to an abandoned request and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic generation counter.
#[derive(Debug, Default)]
pub struct SessionCounter {
    generation: AtomicU64,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SessionToken {
        SessionToken(self.generation.load(Ordering::SeqCst))
    }

    /// Starts a new generation, invalidating every outstanding token.
    pub fn advance(&self) -> SessionToken {
        SessionToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Advances only if `expected` is still current.
    ///
    /// Continuations (next verse, next page) use this so they never override
    /// a user action that started in the meantime.
    pub fn advance_from(&self, expected: SessionToken) -> Option<SessionToken> {
        self.generation
            .compare_exchange(expected.0, expected.0 + 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|previous| SessionToken(previous + 1))
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }
}
