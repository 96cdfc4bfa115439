//! # tvcomet-core
//!
//! Shared vocabulary for the live-update ("comet") transport.
//!
//! - **Wire types**: [`Envelope`] and [`Event`] as exchanged over WebSocket
//!   frames and long-poll bodies
//! - **Dispatcher**: [`Dispatcher`] routes events to listeners by
//!   `notificationClass`, isolating listener failures
//! - **Session guard**: [`SessionGuard`] detects a server restart through a
//!   changed `boxid`
//! - **Retry state**: [`ConnectionState`] and [`RetryPolicy`] hold the
//!   failure counter and reconnect timings
//! - **Log panel**: [`LogPanel`], the passive user-visible log

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod log_panel;
pub mod session;
pub mod state;

pub use dispatcher::{DispatchReport, Dispatcher, HandlerResult, ListenerId};
pub use envelope::{CLASS_FIELD, Envelope, Event};
pub use errors::{CometError, HandlerError, Result};
pub use log_panel::{LogLine, LogPanel, PanelLevel};
pub use session::{ReloadReason, SessionGuard, Verdict};
pub use state::{ConnectionState, DEFAULT_RELOAD_CEILING, RetryPolicy};
