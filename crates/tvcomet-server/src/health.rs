//! `/health` snapshot of the mailbox hub.

use std::time::Duration;

use serde::Serialize;

use crate::hub::MailboxHub;

/// Whether the hub still accepts work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubStatus {
    /// Serving polls and sockets.
    Ok,
    /// Shutdown began; polls answer 400.
    Stopping,
}

/// Body of `GET /health`.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    /// Hub status.
    pub status: HubStatus,
    /// Whole seconds since the server was created.
    pub uptime_secs: u64,
    /// Live mailboxes.
    pub mailboxes: usize,
    /// Attached WebSockets across all mailboxes.
    pub sockets: usize,
}

impl HealthResponse {
    /// Read the counters of `hub`.
    pub fn snapshot(hub: &MailboxHub, uptime: Duration) -> Self {
        Self {
            status: if hub.is_running() {
                HubStatus::Ok
            } else {
                HubStatus::Stopping
            },
            uptime_secs: uptime.as_secs(),
            mailboxes: hub.mailbox_count(),
            sockets: hub.socket_count(),
        }
    }
}
