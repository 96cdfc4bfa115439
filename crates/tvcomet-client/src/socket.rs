//! WebSocket channel.
//!
//! One persistent connection to `comet/ws`, reconnected after every close.
//! The failure counter only resets when a message arrives: a connection
//! that opens and immediately drops keeps counting toward the reload
//! ceiling.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{SEC_WEBSOCKET_PROTOCOL, USER_AGENT};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tvcomet_core::state::{PROBLEM_TEXT, RECONNECTED_TEXT, RECONNECTING_TEXT};
use tvcomet_core::{CometError, ConnectionState, ReloadReason};

use crate::context::{ChannelExit, CometContext, Processed};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    /// Handshake in progress.
    Connecting,
    /// Frames flowing.
    Open,
    /// Closed, waiting to reconnect.
    Closed,
    /// An error was reported; a close follows.
    Errored,
}

/// What to do after a close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseAction {
    /// Open a new connection after the delay.
    Reconnect(Duration),
    /// Too many failures; start over.
    Reload(ReloadReason),
}

/// Persistent WebSocket transport.
pub struct SocketChannel {
    ctx: Arc<CometContext>,
    conn: ConnectionState,
    state: SocketState,
}

impl SocketChannel {
    /// Channel with a fresh failure counter.
    pub fn new(ctx: Arc<CometContext>) -> Self {
        let conn = ConnectionState::new(ctx.socket_policy());
        Self {
            ctx,
            conn,
            state: SocketState::Closed,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Consecutive failures since the last received message.
    pub fn failures(&self) -> u32 {
        self.conn.failures()
    }

    /// The handshake completed. Does not reset the failure counter.
    pub fn on_open(&mut self) {
        self.state = SocketState::Open;
        debug!(failures = self.conn.failures(), "live update socket open");
    }

    /// A text frame arrived.
    pub fn on_message(&mut self, text: &str) -> Processed {
        if self.conn.record_success() {
            info!("live update socket recovered");
            self.ctx.log().info(RECONNECTED_TEXT);
        }
        self.ctx.process(text)
    }

    /// The connection reported an error.
    pub fn on_error(&mut self, err: &CometError) {
        self.state = SocketState::Errored;
        let failures = self.conn.record_failure();
        warn!(error = %err, kind = err.error_kind(), failures, "live update socket error");
        if failures == 1 {
            self.ctx.log().warn(PROBLEM_TEXT);
        }
    }

    /// The connection closed. Decides between reconnecting and reloading.
    pub fn on_close(&mut self) -> CloseAction {
        self.state = SocketState::Closed;
        let failures = self.conn.failures();
        if self.conn.should_reload() {
            warn!(failures, "live update socket giving up");
            return CloseAction::Reload(ReloadReason::TooManyFailures { failures });
        }
        if failures > 1 {
            self.ctx.log().info(RECONNECTING_TEXT);
        }
        CloseAction::Reconnect(self.conn.next_delay())
    }

    /// Handshake request: endpoint URL, subprotocol and user agent.
    pub fn request(&self) -> tvcomet_core::Result<Request> {
        let boxid = self.ctx.session().current();
        let url = self.ctx.endpoints().socket_url(boxid.as_deref())?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| CometError::InvalidUrl(format!("{url}: {e}")))?;
        let settings = self.ctx.settings();
        let protocol = HeaderValue::from_str(&settings.subprotocol)
            .map_err(|e| CometError::Transport(format!("bad subprotocol: {e}")))?;
        let _ = request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        if let Some(agent) = &settings.user_agent {
            let agent = HeaderValue::from_str(agent)
                .map_err(|e| CometError::Transport(format!("bad user agent: {e}")))?;
            let _ = request.headers_mut().insert(USER_AGENT, agent);
        }
        Ok(request)
    }

    /// Connect, pump frames and reconnect until reload or cancellation.
    pub async fn run(mut self, cancel: CancellationToken) -> ChannelExit {
        loop {
            self.state = SocketState::Connecting;
            match self.request() {
                Ok(request) => {
                    let connected = tokio::select! {
                        () = cancel.cancelled() => return ChannelExit::Cancelled,
                        result = connect_async(request) => result,
                    };
                    match connected {
                        Ok((stream, _)) => {
                            self.on_open();
                            if let Some(exit) = self.pump(stream, &cancel).await {
                                return exit;
                            }
                        }
                        Err(e) => self.on_error(&CometError::Transport(e.to_string())),
                    }
                }
                Err(e) => self.on_error(&e),
            }

            match self.on_close() {
                CloseAction::Reload(reason) => return ChannelExit::Reload(reason),
                CloseAction::Reconnect(delay) => {
                    tokio::select! {
                        () = cancel.cancelled() => return ChannelExit::Cancelled,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Read frames until the connection ends. `Some` means stop the channel.
    async fn pump(&mut self, mut stream: WsStream, cancel: &CancellationToken) -> Option<ChannelExit> {
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => {
                    let _ = stream.close(None).await;
                    return Some(ChannelExit::Cancelled);
                }
                frame = stream.next() => frame,
            };
            let processed = match frame {
                Some(Ok(Message::Text(text))) => self.on_message(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.on_message(text),
                    Err(_) => {
                        warn!(len = bytes.len(), "dropping non UTF-8 frame");
                        self.ctx
                            .log()
                            .error(format!("Failed to parse live update: {}", CometError::InvalidUtf8));
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "live update socket closed by server");
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.on_error(&CometError::Transport(e.to_string()));
                    return None;
                }
                None => return None,
            };
            if let Processed::Reload(reason) = processed {
                let _ = stream.close(None).await;
                return Some(ChannelExit::Reload(reason));
            }
        }
    }
}
