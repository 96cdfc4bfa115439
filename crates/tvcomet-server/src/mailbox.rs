//! A single client session's message queue.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tvcomet_core::{Envelope, Event};

/// Length of a mailbox id in hex characters.
pub const BOXID_LEN: usize = 40;

/// Queue of notifications waiting for one client.
#[derive(Debug)]
pub struct Mailbox {
    id: String,
    messages: Vec<Event>,
    debug: bool,
    sockets: usize,
    /// `None` while a client holds the box (poll in flight or socket attached).
    last_used: Option<Instant>,
}

impl Mailbox {
    /// Create an empty mailbox with a fresh id derived from `tally`.
    pub fn new(tally: u64) -> Self {
        Self {
            id: generate_boxid(tally),
            messages: Vec::new(),
            debug: false,
            sockets: 0,
            last_used: Some(Instant::now()),
        }
    }

    /// The mailbox id sent to clients as `boxid`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a notification.
    pub fn push(&mut self, event: Event) {
        self.messages.push(event);
    }

    /// Number of queued notifications.
    pub fn pending(&self) -> usize {
        self.messages.len()
    }

    /// Whether debug log messages are delivered to this box.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Flip debug delivery, returning the new state.
    pub fn toggle_debug(&mut self) -> bool {
        self.debug = !self.debug;
        self.debug
    }

    /// Attached WebSocket count.
    pub fn sockets(&self) -> usize {
        self.sockets
    }

    pub(crate) fn attach(&mut self) {
        self.sockets += 1;
        self.last_used = None;
    }

    pub(crate) fn detach(&mut self) {
        self.sockets = self.sockets.saturating_sub(1);
        self.last_used = Some(Instant::now());
    }

    /// Mark the box as held by a client.
    pub(crate) fn hold(&mut self) {
        self.last_used = None;
    }

    /// End a hold that finished without draining. A box that is not held
    /// keeps its last stamp.
    pub(crate) fn release(&mut self) {
        if self.last_used.is_none() && self.sockets == 0 {
            self.last_used = Some(Instant::now());
        }
    }

    /// Drain the queue into an envelope and stamp the box as used.
    pub fn drain(&mut self, include_boxid: bool) -> Envelope {
        let boxid = include_boxid.then(|| self.id.clone());
        let messages = std::mem::take(&mut self.messages);
        self.last_used = Some(Instant::now());
        Envelope::new(boxid, messages)
    }

    /// Whether the box can be dropped at `now`.
    pub fn is_expired(&self, now: Instant, idle: std::time::Duration) -> bool {
        self.sockets == 0 && self.last_used.is_some_and(|used| used + idle < now)
    }
}

/// Derive a 40-hex-char id from the clock and a creation counter.
pub fn generate_boxid(tally: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(tally.to_le_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(BOXID_LEN);
    for byte in digest.iter().take(BOXID_LEN / 2) {
        let _ = write!(id, "{byte:02x}");
    }
    id
}
