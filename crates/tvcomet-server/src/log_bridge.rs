//! Forwards `tracing` events to connected clients as `logmessage`s.
//!
//! Only events from `tvcomet*` targets are forwarded. Events below TRACE are
//! copied into every mailbox; DEBUG events only reach mailboxes that enabled
//! debug delivery through `/comet/debug`.

use std::cell::Cell;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::hub::MailboxHub;

/// Target prefix of events sent to clients.
pub const FORWARDED_PREFIX: &str = "tvcomet";

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// `tracing` layer feeding the mailbox hub.
pub struct CometLogLayer {
    hub: Arc<MailboxHub>,
}

impl CometLogLayer {
    /// Forward events into `hub`.
    pub fn new(hub: Arc<MailboxHub>) -> Self {
        Self { hub }
    }
}

impl<S: Subscriber> Layer<S> for CometLogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = *meta.level();
        if level == Level::TRACE || !meta.target().starts_with(FORWARDED_PREFIX) {
            return;
        }
        if !self.hub.is_running() {
            return;
        }
        // Anything logged while forwarding must not be forwarded again.
        if FORWARDING.with(|f| f.replace(true)) {
            return;
        }
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let text = format_line(
            Local::now(),
            subsystem(meta.target()),
            &visitor.finish(),
        );
        self.hub.add_log_message(text, level == Level::DEBUG);
        FORWARDING.with(|f| f.set(false));
    }
}

/// Render a log line the way the console shows it: `%F %T subsystem: text`.
pub fn format_line(at: DateTime<Local>, subsystem: &str, text: &str) -> String {
    format!("{} {subsystem}: {text}", at.format("%F %T"))
}

fn subsystem(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_owned()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
