//! # tvcomet-client
//!
//! Receiving side of the live-update transport.
//!
//! - [`CometContext`] owns the dispatcher, session guard and log panel of
//!   one client session and turns payloads into dispatched events
//! - [`select_transport`] picks WebSocket or long-poll once at start-up
//! - [`SocketChannel`] keeps a WebSocket open and reloads after too many
//!   consecutive failures
//! - [`PollChannel`] long-polls with backoff and never gives up
//!
//! Channels run until they return a [`ChannelExit`]. On
//! [`ChannelExit::Reload`] the caller drops the context and builds a new
//! one.

#![deny(unsafe_code)]

pub mod context;
pub mod endpoint;
pub mod poll;
pub mod selector;
pub mod socket;

pub use context::{ChannelExit, CometContext, Processed};
pub use endpoint::Endpoints;
pub use poll::PollChannel;
pub use selector::{Capabilities, SelectorPolicy, Transport, TransportKind, select_transport};
pub use socket::{CloseAction, SocketChannel, SocketState};
