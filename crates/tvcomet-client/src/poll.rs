//! Long-poll channel.
//!
//! Repeated POSTs to `comet/poll`. The server holds each request until
//! events are pending or its wait expires. Polling has no reload ceiling
//! and no client-side request timeout.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tvcomet_core::state::{PROBLEM_TEXT, RECONNECTED_TEXT, RECONNECTING_TEXT};
use tvcomet_core::{CometError, ConnectionState};

use crate::context::{ChannelExit, CometContext, Processed};

/// HTTP long-poll transport.
pub struct PollChannel {
    ctx: Arc<CometContext>,
    conn: ConnectionState,
    http: Client,
}

impl PollChannel {
    /// Channel with a fresh failure counter.
    ///
    /// Fails when the HTTP client cannot be built, e.g. for a user agent
    /// that is not a valid header value.
    pub fn new(ctx: Arc<CometContext>) -> tvcomet_core::Result<Self> {
        let mut builder = Client::builder();
        if let Some(agent) = &ctx.settings().user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let http = builder
            .build()
            .map_err(|e| CometError::Transport(format!("http client: {e}")))?;
        let conn = ConnectionState::new(ctx.poll_policy());
        Ok(Self { ctx, conn, http })
    }

    /// Consecutive failed requests.
    pub fn failures(&self) -> u32 {
        self.conn.failures()
    }

    /// Whether the next request asks the server to answer at once.
    ///
    /// Set while recovering so the client learns quickly whether the
    /// server is back.
    pub fn immediate(&self) -> bool {
        self.conn.failures() > 0
    }

    /// Form fields for the next request.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("immediate", if self.immediate() { "1" } else { "0" }.to_owned())];
        if let Some(boxid) = self.ctx.session().current() {
            form.push(("boxid", boxid));
        }
        form
    }

    /// A response body arrived. Returns what happened and the next delay.
    ///
    /// A malformed body is dropped but still counts as a healthy round
    /// trip.
    pub fn on_success(&mut self, body: &str) -> (Processed, Duration) {
        if self.conn.record_success() {
            info!("live update poll recovered");
            self.ctx.log().info(RECONNECTED_TEXT);
        }
        let processed = self.ctx.process(body);
        (processed, self.conn.next_delay())
    }

    /// The request failed. Returns the delay before retrying.
    pub fn on_failure(&mut self, err: &CometError) -> Duration {
        let failures = self.conn.record_failure();
        warn!(error = %err, kind = err.error_kind(), failures, "live update poll failed");
        if failures == 1 {
            self.ctx.log().warn(PROBLEM_TEXT);
        } else {
            self.ctx.log().info(RECONNECTING_TEXT);
        }
        self.conn.next_delay()
    }

    /// Issue one poll request and read the body.
    pub async fn fetch(&self) -> tvcomet_core::Result<String> {
        let url = self.ctx.endpoints().poll_url()?;
        let response = self
            .http
            .post(url)
            .form(&self.form())
            .send()
            .await
            .map_err(|e| CometError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CometError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| CometError::Transport(e.to_string()))
    }

    /// Poll until reload or cancellation.
    pub async fn run(mut self, cancel: CancellationToken) -> ChannelExit {
        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return ChannelExit::Cancelled,
                result = self.fetch() => result,
            };
            let delay = match result {
                Ok(body) => match self.on_success(&body) {
                    (Processed::Reload(reason), _) => return ChannelExit::Reload(reason),
                    (_, delay) => delay,
                },
                Err(e) => self.on_failure(&e),
            };
            debug!(?delay, failures = self.conn.failures(), "next live update poll");
            tokio::select! {
                () = cancel.cancelled() => return ChannelExit::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
