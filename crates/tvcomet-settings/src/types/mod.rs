//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes. Each type implements
//! [`Default`] with production values.

mod client;
mod server;

pub use client::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "client": { "baseUrl": "http://tv.local:9981/", "reloadCeiling": 8 },
///   "server": { "port": 9981 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CometSettings {
    /// Live-update client settings.
    pub client: ClientSettings,
    /// Mailbox server settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl CometSettings {
    /// Reject combinations the transport cannot run with.
    pub fn validate(&self) -> Result<()> {
        let client = &self.client;
        if client.subprotocol.trim().is_empty() {
            return Err(SettingsError::invalid("client.subprotocol", "must not be empty"));
        }
        if !(client.base_url.starts_with("http://") || client.base_url.starts_with("https://")) {
            return Err(SettingsError::invalid(
                "client.baseUrl",
                format!("{} is not an http(s) URL", client.base_url),
            ));
        }
        let server = &self.server;
        for (field, value) in [
            ("server.pollWaitMs", server.poll_wait_ms),
            ("server.sweepIntervalMs", server.sweep_interval_ms),
            ("server.socketFlushIntervalMs", server.socket_flush_interval_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::invalid(field, "must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_produces_defaults() {
        let settings: CometSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.client.reload_ceiling, Some(5));
        assert_eq!(settings.server.port, 9981);
        assert_eq!(settings.logging.level, LogLevel::Info);
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(CometSettings::default()).unwrap();
        assert!(json["client"].get("baseUrl").is_some());
        assert!(json["client"].get("excludedAgents").is_some());
        assert!(json["server"].get("mailboxIdleMs").is_some());
        assert!(json["logging"].get("cometBridge").is_some());
    }

    #[test]
    fn defaults_validate() {
        CometSettings::default().validate().unwrap();
    }

    #[test]
    fn empty_subprotocol_rejected() {
        let mut settings = CometSettings::default();
        settings.client.subprotocol = "  ".into();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                field: "client.subprotocol",
                ..
            })
        ));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let mut settings = CometSettings::default();
        settings.client.base_url = "ftp://tv.local/".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut settings = CometSettings::default();
        settings.server.socket_flush_interval_ms = 0;
        let err = settings.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid server.socketFlushIntervalMs: must be positive");
    }
}
