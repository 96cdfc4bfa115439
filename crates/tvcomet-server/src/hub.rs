//! In-memory mailbox table shared by the poll and WebSocket endpoints.
//!
//! Every connected client owns one [`Mailbox`]. Notifications are copied
//! into each mailbox and handed out either as a long-poll reply or as a
//! WebSocket frame. Waiters are woken through a single [`Notify`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tvcomet_core::{Envelope, Event};
use tvcomet_settings::ServerSettings;

use crate::errors::HubError;
use crate::mailbox::Mailbox;

/// Timing knobs of the hub.
#[derive(Clone, Copy, Debug)]
pub struct HubConfig {
    /// Longest a non-immediate poll waits for a message.
    pub poll_wait: Duration,
    /// Pause before serving a non-immediate poll.
    pub poll_settle: Duration,
    /// Idle time after which an unattached mailbox is dropped.
    pub mailbox_idle: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for HubConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            poll_wait: settings.poll_wait(),
            poll_settle: settings.poll_settle(),
            mailbox_idle: settings.mailbox_idle(),
        }
    }
}

/// Addresses of the connection that created a mailbox.
#[derive(Clone, Copy, Debug, Default)]
pub struct Origin {
    /// Remote address of the client.
    pub peer: Option<SocketAddr>,
    /// Local address the client connected to.
    pub local: Option<SocketAddr>,
}

/// The mailbox table.
pub struct MailboxHub {
    config: HubConfig,
    boxes: Mutex<HashMap<String, Mailbox>>,
    notify: Notify,
    running: AtomicBool,
    tally: AtomicU64,
}

impl MailboxHub {
    /// Create a running hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            boxes: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            running: AtomicBool::new(true),
            tally: AtomicU64::new(0),
        }
    }

    /// Hub timings.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Whether the hub still serves clients.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Look up `boxid`, or create a fresh seeded mailbox when it is absent
    /// or unknown. Marks the mailbox as held. Returns its id.
    pub fn find_or_create(&self, boxid: Option<&str>, origin: &Origin) -> Result<String, HubError> {
        if !self.is_running() {
            return Err(HubError::ShuttingDown);
        }
        let mut boxes = self.boxes.lock();
        if let Some(mb) = boxid.and_then(|id| boxes.get_mut(id)) {
            mb.hold();
            return Ok(mb.id().to_owned());
        }

        let tally = self.tally.fetch_add(1, Ordering::Relaxed);
        let mut mb = Mailbox::new(tally);
        mb.push(access_update(origin));
        mb.push(server_ip_port(origin));
        mb.hold();
        let id = mb.id().to_owned();
        let _ = boxes.insert(id.clone(), mb);
        drop(boxes);
        debug!(boxid = %id, requested = ?boxid, "mailbox created");
        Ok(id)
    }

    /// Copy `event` into every mailbox and wake waiters.
    ///
    /// `debug_only` events go only to mailboxes with debug enabled.
    pub fn add_message(&self, event: &Event, debug_only: bool) {
        if !self.is_running() {
            return;
        }
        {
            let mut boxes = self.boxes.lock();
            for mb in boxes.values_mut() {
                if debug_only && !mb.debug() {
                    continue;
                }
                mb.push(event.clone());
            }
        }
        self.notify.notify_waiters();
    }

    /// Queue a `logmessage` notification for every mailbox.
    pub fn add_log_message(&self, text: impl Into<String>, debug_only: bool) {
        let event = Event::new("logmessage", json!({ "logtxt": text.into() }));
        self.add_message(&event, debug_only);
    }

    /// Serve one long-poll request.
    ///
    /// Non-immediate requests pause briefly, then wait up to the poll wait
    /// for a message. The reply always carries `boxid`, even when empty.
    pub async fn poll(
        &self,
        boxid: Option<&str>,
        immediate: bool,
        origin: &Origin,
    ) -> Result<Envelope, HubError> {
        if !immediate {
            tokio::time::sleep(self.config.poll_settle).await;
        }
        let id = self.find_or_create(boxid, origin)?;
        let _hold = PollHold { hub: self, boxid: &id };

        if !immediate {
            let deadline = Instant::now() + self.config.poll_wait;
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                let _ = notified.as_mut().enable();

                if !self.is_running() {
                    return Err(HubError::ShuttingDown);
                }
                if self.pending(&id) > 0 {
                    break;
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    break;
                }
            }
            if !self.is_running() {
                return Err(HubError::ShuttingDown);
            }
        }

        let drained = self.boxes.lock().get_mut(&id).map(|mb| mb.drain(true));
        drained.ok_or_else(|| HubError::UnknownMailbox(id.clone()))
    }

    /// Flip debug delivery for `boxid` and tell its client about it.
    ///
    /// Returns the new state, or `None` when the mailbox is unknown.
    pub fn toggle_debug(&self, boxid: &str) -> Option<bool> {
        let enabled = {
            let mut boxes = self.boxes.lock();
            let mb = boxes.get_mut(boxid)?;
            let enabled = mb.toggle_debug();
            let text = if enabled {
                "Loglevel debug: enabled"
            } else {
                "Loglevel debug: disabled"
            };
            mb.push(Event::new("logmessage", json!({ "logtxt": text })));
            enabled
        };
        info!(boxid, enabled, "debug log delivery toggled");
        self.notify.notify_waiters();
        Some(enabled)
    }

    /// Register a WebSocket on `boxid` (creating the mailbox as needed).
    pub fn attach(&self, boxid: Option<&str>, origin: &Origin) -> Result<String, HubError> {
        let id = self.find_or_create(boxid, origin)?;
        let mut boxes = self.boxes.lock();
        let mb = boxes
            .get_mut(&id)
            .ok_or_else(|| HubError::UnknownMailbox(id.clone()))?;
        mb.attach();
        Ok(id)
    }

    /// Unregister a WebSocket from `boxid`.
    pub fn detach(&self, boxid: &str) {
        if let Some(mb) = self.boxes.lock().get_mut(boxid) {
            mb.detach();
        }
    }

    /// Drain `boxid` into a WebSocket frame, if it has anything queued.
    pub fn take_frame(&self, boxid: &str, include_boxid: bool) -> Option<Envelope> {
        if !self.is_running() {
            return None;
        }
        let mut boxes = self.boxes.lock();
        let mb = boxes.get_mut(boxid)?;
        if mb.pending() == 0 {
            return None;
        }
        let frame = mb.drain(include_boxid);
        mb.hold();
        Some(frame)
    }

    /// Drop mailboxes that are unattached and idle. Returns how many.
    pub fn flush_expired(&self) -> usize {
        let now = Instant::now();
        let idle = self.config.mailbox_idle;
        let mut expired = Vec::new();
        self.boxes.lock().retain(|id, mb| {
            if mb.is_expired(now, idle) {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        // Logged outside the lock: the log bridge writes back into the table.
        for id in &expired {
            debug!(boxid = %id, "mailbox expired");
        }
        expired.len()
    }

    /// Stop serving and wake every waiter.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!(mailboxes = self.mailbox_count(), "comet hub shutting down");
        }
        self.notify.notify_waiters();
    }

    /// Future resolving on the next wake-up.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Queued notifications for `boxid`.
    pub fn pending(&self, boxid: &str) -> usize {
        self.boxes.lock().get(boxid).map_or(0, Mailbox::pending)
    }

    /// Whether debug delivery is on for `boxid`.
    pub fn debug_enabled(&self, boxid: &str) -> bool {
        self.boxes.lock().get(boxid).is_some_and(Mailbox::debug)
    }

    /// Number of live mailboxes.
    pub fn mailbox_count(&self) -> usize {
        self.boxes.lock().len()
    }

    /// Number of attached WebSockets.
    pub fn socket_count(&self) -> usize {
        self.boxes.lock().values().map(Mailbox::sockets).sum()
    }

    /// Run [`flush_expired`](Self::flush_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let dropped = hub.flush_expired();
                        if dropped > 0 {
                            debug!(dropped, "expired mailboxes flushed");
                        }
                    }
                }
            }
        })
    }
}

/// Releases a poll's hold on its mailbox when the poll ends, including
/// when the request is dropped mid-wait.
struct PollHold<'a> {
    hub: &'a MailboxHub,
    boxid: &'a str,
}

impl Drop for PollHold<'_> {
    fn drop(&mut self) {
        if let Some(mb) = self.hub.boxes.lock().get_mut(self.boxid) {
            mb.release();
        }
    }
}

fn access_update(origin: &Origin) -> Event {
    let address = origin.peer.map(|a| a.ip().to_string()).unwrap_or_default();
    Event::new(
        "accessUpdate",
        json!({
            "time": chrono::Utc::now().timestamp(),
            "address": address,
        }),
    )
}

fn server_ip_port(origin: &Origin) -> Event {
    let (ip, port) = origin
        .local
        .map_or((String::new(), 0), |a| (a.ip().to_string(), a.port()));
    Event::new("setServerIpPort", json!({ "ip": ip, "port": port }))
}
