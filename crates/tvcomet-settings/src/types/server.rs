//! Mailbox server and logging settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Mailbox server network and timing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Longest a poll request waits for a message, in milliseconds.
    pub poll_wait_ms: u64,
    /// Pause before a non-immediate poll is served, in milliseconds.
    pub poll_settle_ms: u64,
    /// Idle time after which an unattached mailbox is dropped, in milliseconds.
    pub mailbox_idle_ms: u64,
    /// Interval of the expiry sweeper, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Interval at which sockets re-check their mailbox, in milliseconds.
    pub socket_flush_interval_ms: u64,
    /// WebSocket sub-protocol accepted on upgrade.
    pub subprotocol: String,
}

impl ServerSettings {
    /// Poll wait as a [`Duration`].
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    /// Poll settle pause as a [`Duration`].
    pub fn poll_settle(&self) -> Duration {
        Duration::from_millis(self.poll_settle_ms)
    }

    /// Mailbox idle expiry as a [`Duration`].
    pub fn mailbox_idle(&self) -> Duration {
        Duration::from_millis(self.mailbox_idle_ms)
    }

    /// Sweeper interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Socket flush interval as a [`Duration`].
    pub fn socket_flush_interval(&self) -> Duration {
        Duration::from_millis(self.socket_flush_interval_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9981,
            poll_wait_ms: 10_000,
            poll_settle_ms: 100,
            mailbox_idle_ms: 60_000,
            sweep_interval_ms: 10_000,
            socket_flush_interval_ms: 1_000,
            subprotocol: "tvheadend-comet".to_string(),
        }
    }
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Forward server log events to mailboxes as `logmessage`s.
    pub comet_bridge: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.poll_wait(), Duration::from_secs(10));
        assert_eq!(s.poll_settle(), Duration::from_millis(100));
        assert_eq!(s.mailbox_idle(), Duration::from_secs(60));
        assert_eq!(s.socket_flush_interval(), Duration::from_secs(1));
        assert_eq!(s.subprotocol, "tvheadend-comet");
    }

    #[test]
    fn log_level_filter_strings() {
        assert_eq!(LogLevel::Trace.as_filter_str(), "trace");
        assert_eq!(LogLevel::Warn.as_filter_str(), "warn");
    }

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn log_level_serde_lowercase() {
        let json = serde_json::to_string(&LogLevel::Error).unwrap();
        assert_eq!(json, "\"error\"");
        let back: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(back, LogLevel::Debug);
    }
}
