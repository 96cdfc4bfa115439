//! # tvcomet-server
//!
//! Server half of the live-update transport.
//!
//! - [`MailboxHub`]: one message queue per client session, woken through a
//!   shared notifier and swept when idle
//! - [`CometServer`]: Axum routes `/comet/poll`, `/comet/ws`, `/comet/debug`
//!   and `/health`
//! - [`CometLogLayer`]: forwards `tracing` events to clients as
//!   `logmessage` notifications
//! - [`ShutdownCoordinator`]: stops the hub and all tasks together

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod hub;
pub mod log_bridge;
pub mod mailbox;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::HubError;
pub use hub::{HubConfig, MailboxHub, Origin};
pub use log_bridge::CometLogLayer;
pub use mailbox::{BOXID_LEN, Mailbox};
pub use server::{AppState, CometServer};
pub use shutdown::ShutdownCoordinator;
