//! Live-update client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the client reaches the server and recovers from failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Base URL of the admin console (the page URL).
    pub base_url: String,
    /// WebSocket sub-protocol offered on connect.
    pub subprotocol: String,
    /// Whether the runtime may use WebSocket at all.
    pub websocket: bool,
    /// User agent reported to the transport selector and sent on requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// User-agent substrings for which WebSocket is never used.
    pub excluded_agents: Vec<String>,
    /// Consecutive socket failures tolerated before reload.
    ///
    /// A count, or `"off"` to never reload. In the settings file `null`
    /// keeps the default like any other key.
    #[serde(with = "ceiling")]
    pub reload_ceiling: Option<u32>,
    /// Delay between polls while healthy, in milliseconds.
    pub poll_healthy_delay_ms: u64,
    /// Delay after the first failure, in milliseconds.
    pub short_retry_delay_ms: u64,
    /// Delay once failures accumulate, in milliseconds.
    pub sustained_retry_delay_ms: u64,
    /// Lines kept in the log panel.
    pub log_panel_capacity: usize,
}

impl ClientSettings {
    /// Healthy poll delay.
    pub fn poll_healthy_delay(&self) -> Duration {
        Duration::from_millis(self.poll_healthy_delay_ms)
    }

    /// First-failure delay.
    pub fn short_retry_delay(&self) -> Duration {
        Duration::from_millis(self.short_retry_delay_ms)
    }

    /// Sustained-failure delay.
    pub fn sustained_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sustained_retry_delay_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9981/".to_string(),
            subprotocol: "tvheadend-comet".to_string(),
            websocket: true,
            user_agent: None,
            excluded_agents: vec!["Konqueror".to_string()],
            reload_ceiling: Some(5),
            poll_healthy_delay_ms: 100,
            short_retry_delay_ms: 50,
            sustained_retry_delay_ms: 1000,
            log_panel_capacity: 200,
        }
    }
}

/// `Option<u32>` written as a count or `"off"`.
mod ceiling {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(u32),
        Word(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(count) => serializer.serialize_u32(*count),
            None => serializer.serialize_str("off"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Count(count)) => Ok(Some(count)),
            Some(Raw::Word(word)) => crate::loader::parse_ceiling(&word).ok_or_else(|| {
                D::Error::custom(format!("reloadCeiling must be a count or \"off\", got {word:?}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ClientSettings::default();
        assert_eq!(s.subprotocol, "tvheadend-comet");
        assert!(s.websocket);
        assert_eq!(s.excluded_agents, vec!["Konqueror"]);
        assert_eq!(s.poll_healthy_delay(), Duration::from_millis(100));
        assert_eq!(s.short_retry_delay(), Duration::from_millis(50));
        assert_eq!(s.sustained_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn null_ceiling_disables_reload() {
        let s: ClientSettings = serde_json::from_str(r#"{"reloadCeiling": null}"#).unwrap();
        assert!(s.reload_ceiling.is_none());
    }

    #[test]
    fn off_ceiling_round_trips() {
        let s: ClientSettings = serde_json::from_str(r#"{"reloadCeiling": "off"}"#).unwrap();
        assert!(s.reload_ceiling.is_none());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["reloadCeiling"], "off");

        let s: ClientSettings = serde_json::from_value(json).unwrap();
        assert!(s.reload_ceiling.is_none());
        assert!(serde_json::from_str::<ClientSettings>(r#"{"reloadCeiling": "sometimes"}"#).is_err());
    }

    #[test]
    fn user_agent_omitted_when_none() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert!(json.get("userAgent").is_none());
    }
}
