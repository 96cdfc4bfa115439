//! Server teardown: stop the hub, cancel background tasks, wait for them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::hub::MailboxHub;

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Ties the hub's stopped flag to the token every server task watches.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    hub: Arc<MailboxHub>,
}

impl ShutdownCoordinator {
    /// Coordinator for `hub`.
    pub fn new(hub: Arc<MailboxHub>) -> Self {
        Self {
            token: CancellationToken::new(),
            hub,
        }
    }

    /// Token cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop the hub and cancel the token. Pending polls answer 400 and
    /// sockets close. Repeated calls do nothing more.
    pub fn shutdown(&self) {
        self.hub.shutdown();
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down, then wait for `handles` until a shared deadline.
    ///
    /// Tasks still running at the deadline are aborted. Returns how many
    /// were aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> usize {
        self.shutdown();
        let deadline = Instant::now() + timeout.unwrap_or(DRAIN_TIMEOUT);
        debug!(tasks = handles.len(), "draining server tasks");

        let mut aborted = 0;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "server task ended abnormally"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        if aborted > 0 {
            warn!(aborted, "server tasks outlived the shutdown deadline");
        }
        aborted
    }
}
