//! Application context shared by the transport channels.
//!
//! One context per client session: listener registry, session guard, log
//! panel and settings. A reload drops the context and builds a new one.

use std::sync::Arc;

use tracing::warn;
use tvcomet_core::{
    DispatchReport, Dispatcher, Envelope, LogPanel, ReloadReason, RetryPolicy, SessionGuard,
    Verdict,
};
use tvcomet_settings::ClientSettings;

use crate::endpoint::Endpoints;
use crate::selector::{Capabilities, SelectorPolicy, TransportKind, select_transport};

/// What happened to one received payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Processed {
    /// Events were handed to the dispatcher.
    Dispatched(DispatchReport),
    /// The payload was malformed and dropped.
    Dropped,
    /// The session changed; nothing was dispatched.
    Reload(ReloadReason),
}

/// Why a channel stopped running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelExit {
    /// The client must discard its state and start over.
    Reload(ReloadReason),
    /// Teardown was requested.
    Cancelled,
}

/// Dispatcher, session guard, log panel and settings of one client session.
pub struct CometContext {
    dispatcher: Dispatcher,
    session: SessionGuard,
    log: Arc<LogPanel>,
    settings: ClientSettings,
    endpoints: Endpoints,
}

impl CometContext {
    /// Build a context from settings.
    pub fn new(settings: ClientSettings) -> tvcomet_core::Result<Self> {
        let log = Arc::new(LogPanel::new(settings.log_panel_capacity));
        Self::with_log(settings, log)
    }

    /// Build a context that writes to an existing log panel.
    ///
    /// The panel outlives reloads so the user keeps seeing earlier lines.
    pub fn with_log(settings: ClientSettings, log: Arc<LogPanel>) -> tvcomet_core::Result<Self> {
        let endpoints = Endpoints::new(&settings.base_url)?;
        Ok(Self {
            dispatcher: Dispatcher::new(log.clone()),
            session: SessionGuard::new(),
            log,
            settings,
            endpoints,
        })
    }

    /// Listener registry.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Session identity guard.
    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    /// User-visible log.
    pub fn log(&self) -> &Arc<LogPanel> {
        &self.log
    }

    /// Client settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Server endpoints.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Reconnect timings for the WebSocket channel.
    pub fn socket_policy(&self) -> RetryPolicy {
        RetryPolicy {
            healthy_delay: self.settings.short_retry_delay(),
            first_retry_delay: self.settings.short_retry_delay(),
            sustained_retry_delay: self.settings.sustained_retry_delay(),
            reload_ceiling: self.settings.reload_ceiling,
        }
    }

    /// Retry timings for the poll channel. Polling never reloads.
    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy {
            healthy_delay: self.settings.poll_healthy_delay(),
            first_retry_delay: self.settings.short_retry_delay(),
            sustained_retry_delay: self.settings.sustained_retry_delay(),
            reload_ceiling: None,
        }
    }

    /// Pick the transport for this runtime.
    pub fn select_transport(&self) -> TransportKind {
        select_transport(
            &Capabilities::from_settings(&self.settings),
            &SelectorPolicy::from_settings(&self.settings),
        )
    }

    /// Parse, guard and dispatch one payload.
    pub fn process(&self, text: &str) -> Processed {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "dropping malformed live update");
                self.log.error(format!("Failed to parse live update: {e}"));
                return Processed::Dropped;
            }
        };
        match self.session.observe(&envelope) {
            Verdict::Continue => Processed::Dispatched(self.dispatcher.dispatch(&envelope)),
            Verdict::Reload(reason) => {
                self.log.warn(format!("Reloading: {reason}"));
                Processed::Reload(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn ctx() -> CometContext {
        CometContext::new(ClientSettings::default()).unwrap()
    }

    #[test]
    fn example_envelope_dispatched_once() {
        let ctx = ctx();
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = seen.clone();
        let _ = ctx.dispatcher().on("channels", move |e| {
            sink.lock().push(e.to_value());
            Ok(())
        });

        let out = ctx.process(
            r#"{"boxid":"abc123","messages":[{"notificationClass":"channels","reload":1}]}"#,
        );
        assert!(matches!(out, Processed::Dispatched(r) if r.delivered == 1));
        assert_eq!(
            *seen.lock(),
            vec![json!({"notificationClass": "channels", "reload": 1})]
        );
        assert_eq!(ctx.session().current().as_deref(), Some("abc123"));
    }

    #[test]
    fn session_change_reloads_before_dispatch() {
        let ctx = ctx();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        let _ = ctx.dispatcher().on("x", move |_| {
            *sink.lock() += 1;
            Ok(())
        });

        let _ = ctx.process(r#"{"boxid":"A","messages":[{"notificationClass":"x"}]}"#);
        let out = ctx.process(r#"{"boxid":"B","messages":[{"notificationClass":"x"}]}"#);
        assert_eq!(
            out,
            Processed::Reload(ReloadReason::SessionChanged {
                previous: "A".into(),
                current: "B".into(),
            })
        );
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn malformed_payload_dropped_and_logged() {
        let ctx = ctx();
        assert_eq!(ctx.process("{oops"), Processed::Dropped);
        assert_eq!(ctx.process(r#"{"messages":[{"no":"class"}]}"#), Processed::Dropped);
        assert_eq!(ctx.log().count(tvcomet_core::PanelLevel::Error), 2);
        // The channel keeps going: a good payload still dispatches.
        assert!(matches!(ctx.process(r#"{"messages":[]}"#), Processed::Dispatched(_)));
    }

    #[test]
    fn policies_follow_settings() {
        let settings = ClientSettings {
            reload_ceiling: Some(2),
            short_retry_delay_ms: 5,
            ..ClientSettings::default()
        };
        let ctx = CometContext::new(settings).unwrap();
        let socket = ctx.socket_policy();
        assert_eq!(socket.reload_ceiling, Some(2));
        assert_eq!(socket.delay_for(0), Duration::from_millis(5));
        assert_eq!(socket.delay_for(2), Duration::from_secs(1));
        let poll = ctx.poll_policy();
        assert_eq!(poll.reload_ceiling, None);
        assert_eq!(poll.delay_for(0), Duration::from_millis(100));
        assert_eq!(poll.delay_for(1), Duration::from_millis(5));
    }

    #[test]
    fn default_policies_match_builtin() {
        let ctx = ctx();
        assert_eq!(ctx.socket_policy(), RetryPolicy::socket());
        assert_eq!(ctx.poll_policy(), RetryPolicy::poll());
    }

    #[test]
    fn bad_base_url_rejected() {
        let settings = ClientSettings {
            base_url: "not a url".into(),
            ..ClientSettings::default()
        };
        assert!(CometContext::new(settings).is_err());
    }
}
