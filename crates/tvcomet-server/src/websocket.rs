//! `/comet/ws` session: pushes mailbox contents as frames.

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, instrument, warn};

use crate::hub::Origin;
use crate::server::AppState;

/// Serve one upgraded WebSocket until the client leaves or the hub stops.
///
/// The mailbox is checked on every hub wake-up and at least once per flush
/// interval. Only the first frame carries `boxid`; empty mailboxes send
/// nothing.
#[instrument(skip_all, fields(boxid))]
pub async fn run_socket(mut socket: WebSocket, state: AppState, boxid: Option<String>, origin: Origin) {
    let id = match state.hub.attach(boxid.as_deref(), &origin) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "rejecting comet socket");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let _ = tracing::Span::current().record("boxid", id.as_str());
    debug!(peer = ?origin.peer, "comet socket attached");

    let cancel = state.shutdown.token();
    let mut ticker = tokio::time::interval(state.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut first = true;

    loop {
        let notified = state.hub.notified();
        tokio::pin!(notified);
        let _ = notified.as_mut().enable();

        if !state.hub.is_running() {
            break;
        }
        if let Some(frame) = state.hub.take_frame(&id, first) {
            first = false;
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        debug!("send failed, closing");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize comet frame"),
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = notified.as_mut() => {}
            _ = ticker.tick() => {}
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.detach(&id);
    let _ = socket.send(Message::Close(None)).await;
    debug!("comet socket detached");
}
