//! Publish/subscribe registry keyed by `notificationClass`.
//!
//! Listeners are registered once at start-up and invoked in registration
//! order. A failing listener (returned error or panic) is reported to the
//! log panel and never stops delivery to the remaining listeners or events.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::envelope::{Envelope, Event};
use crate::errors::HandlerError;
use crate::log_panel::LogPanel;

/// Return type of a listener.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Handle identifying one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Counts from one dispatch pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events examined.
    pub events: usize,
    /// Listener invocations that completed.
    pub delivered: usize,
    /// Listener invocations that returned an error or panicked.
    pub failed: usize,
}

/// Routes events to the listeners registered for their class.
pub struct Dispatcher {
    routes: RwLock<HashMap<String, Vec<(ListenerId, Handler)>>>,
    next_id: AtomicU64,
    log: Arc<LogPanel>,
}

impl Dispatcher {
    /// Create an empty dispatcher reporting failures to `log`.
    pub fn new(log: Arc<LogPanel>) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            log,
        }
    }

    /// Register `handler` for events of `class`.
    pub fn on<F>(&self, class: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.routes
            .write()
            .entry(class.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut routes = self.routes.write();
        let mut removed = false;
        routes.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Number of listeners registered for `class`.
    pub fn listener_count(&self, class: &str) -> usize {
        self.routes.read().get(class).map_or(0, Vec::len)
    }

    /// Deliver every event of `envelope`, in order.
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in &envelope.messages {
            let (delivered, failed) = self.dispatch_event(event);
            report.events += 1;
            report.delivered += delivered;
            report.failed += failed;
        }
        report
    }

    /// Deliver one event. Returns `(delivered, failed)` invocation counts.
    pub fn dispatch_event(&self, event: &Event) -> (usize, usize) {
        // Snapshot so listeners may register or unregister from a callback.
        let handlers: Vec<(ListenerId, Handler)> = match self.routes.read().get(event.class()) {
            Some(list) => list.clone(),
            None => {
                debug!(class = event.class(), "no listeners for event");
                return (0, 0);
            }
        };

        let mut delivered = 0;
        let mut failed = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    self.log.error(format!(
                        "Live update listener for '{}' failed: {e}",
                        event.class()
                    ));
                    debug!(listener = id.0, class = event.class(), "listener returned error");
                }
                Err(panic) => {
                    failed += 1;
                    self.log.error(format!(
                        "Live update listener for '{}' panicked: {}",
                        event.class(),
                        panic_message(panic.as_ref())
                    ));
                }
            }
        }
        (delivered, failed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
