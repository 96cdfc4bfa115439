//! Transport selection.
//!
//! Chosen once at start-up: WebSocket when the runtime supports it and the
//! user agent is not on the exclusion list, long-poll otherwise.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tvcomet_settings::ClientSettings;

use crate::context::{ChannelExit, CometContext};
use crate::poll::PollChannel;
use crate::socket::SocketChannel;

/// What the runtime can do.
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    /// Whether WebSocket is available.
    pub websocket: bool,
    /// Reported user agent, if any.
    pub user_agent: Option<String>,
}

impl Capabilities {
    /// Capabilities as configured.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            websocket: settings.websocket,
            user_agent: settings.user_agent.clone(),
        }
    }
}

/// User agents that must fall back to polling.
#[derive(Clone, Debug, Default)]
pub struct SelectorPolicy {
    /// Case-insensitive substrings of excluded user agents.
    pub excluded_agents: Vec<String>,
}

impl SelectorPolicy {
    /// Policy as configured.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            excluded_agents: settings.excluded_agents.clone(),
        }
    }

    /// Whether `user_agent` is excluded from WebSocket use.
    pub fn excludes(&self, user_agent: &str) -> bool {
        let agent = user_agent.to_lowercase();
        self.excluded_agents
            .iter()
            .filter(|needle| !needle.is_empty())
            .any(|needle| agent.contains(&needle.to_lowercase()))
    }
}

/// The two transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent WebSocket.
    Socket,
    /// HTTP long-poll.
    Poll,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Socket => "websocket",
            Self::Poll => "poll",
        })
    }
}

/// Pick a transport. Pure: same inputs, same answer.
pub fn select_transport(caps: &Capabilities, policy: &SelectorPolicy) -> TransportKind {
    let excluded = caps
        .user_agent
        .as_deref()
        .is_some_and(|agent| policy.excludes(agent));
    if caps.websocket && !excluded {
        TransportKind::Socket
    } else {
        TransportKind::Poll
    }
}

/// A started channel of either kind.
pub enum Transport {
    /// WebSocket channel.
    Socket(SocketChannel),
    /// Long-poll channel.
    Poll(PollChannel),
}

impl Transport {
    /// Instantiate the channel for `kind`.
    ///
    /// Both kinds reject settings they could never connect with, such as a
    /// user agent that is not a valid header value.
    pub fn start(ctx: Arc<CometContext>, kind: TransportKind) -> tvcomet_core::Result<Self> {
        info!(transport = %kind, "starting live update channel");
        match kind {
            TransportKind::Socket => {
                let channel = SocketChannel::new(ctx);
                let _ = channel.request()?;
                Ok(Self::Socket(channel))
            }
            TransportKind::Poll => PollChannel::new(ctx).map(Self::Poll),
        }
    }

    /// Which kind this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Socket(_) => TransportKind::Socket,
            Self::Poll(_) => TransportKind::Poll,
        }
    }

    /// Run until reload or cancellation.
    pub async fn run(self, cancel: CancellationToken) -> ChannelExit {
        match self {
            Self::Socket(channel) => channel.run(cancel).await,
            Self::Poll(channel) => channel.run(cancel).await,
        }
    }
}
