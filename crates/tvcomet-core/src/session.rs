//! Session identity guard.
//!
//! The server hands out a mailbox id (`boxid`) per client session. If a
//! later envelope carries a different id, the server process restarted and
//! every piece of client state is stale: the only recovery is a full reload.

use std::fmt;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::envelope::Envelope;

/// Why the client must discard its state and start over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadReason {
    /// The server issued a different session identifier.
    SessionChanged {
        /// Identifier seen before.
        previous: String,
        /// Identifier in the offending envelope.
        current: String,
    },
    /// The socket failed more often in a row than the configured ceiling.
    TooManyFailures {
        /// Consecutive failures observed.
        failures: u32,
    },
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionChanged { previous, current } => {
                write!(f, "server session changed ({previous} -> {current})")
            }
            Self::TooManyFailures { failures } => {
                write!(f, "live updates failed {failures} times in a row")
            }
        }
    }
}

/// Outcome of checking one envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Same session (or first sighting): process the envelope.
    Continue,
    /// Session changed: drop the envelope and reload.
    Reload(ReloadReason),
}

/// Remembers the first session identifier seen and flags any change.
#[derive(Debug, Default)]
pub struct SessionGuard {
    boxid: RwLock<Option<String>>,
}

impl SessionGuard {
    /// Create a guard that has not seen a session yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `envelope` against the known session.
    pub fn observe(&self, envelope: &Envelope) -> Verdict {
        let Some(current) = envelope.boxid.as_deref() else {
            return Verdict::Continue;
        };
        let mut known = self.boxid.write();
        match known.as_deref() {
            None => {
                debug!(boxid = current, "session established");
                *known = Some(current.to_owned());
                Verdict::Continue
            }
            Some(previous) if previous == current => Verdict::Continue,
            Some(previous) => {
                warn!(previous, current, "server session changed");
                Verdict::Reload(ReloadReason::SessionChanged {
                    previous: previous.to_owned(),
                    current: current.to_owned(),
                })
            }
        }
    }

    /// The last-seen session identifier.
    pub fn current(&self) -> Option<String> {
        self.boxid.read().clone()
    }
}
