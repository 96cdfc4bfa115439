//! Live-update wire format.
//!
//! Both transports carry the same JSON object:
//!
//! ```json
//! {"boxid": "9f2c…", "messages": [{"notificationClass": "channels", "reload": 1}]}
//! ```
//!
//! `boxid` identifies the server-side mailbox (and thereby the server
//! process). `messages` may be missing, in which case it is empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;

/// Field that selects the dispatcher route of an event.
pub const CLASS_FIELD: &str = "notificationClass";

/// One notification.
///
/// The payload is the complete JSON object as received, including the
/// `notificationClass` field; listeners see exactly what the server sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Event {
    class: String,
    payload: Map<String, Value>,
}

impl Event {
    /// Build an event of `class` from a JSON object of extra fields.
    ///
    /// Non-object `fields` contribute nothing; the class always wins over a
    /// `notificationClass` key inside `fields`.
    pub fn new(class: impl Into<String>, fields: Value) -> Self {
        let class = class.into();
        let mut payload = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let _ = payload.insert(CLASS_FIELD.into(), Value::String(class.clone()));
        Self { class, payload }
    }

    /// The event type (`notificationClass`).
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The full payload object.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Look up a string payload field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// The payload as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

impl TryFrom<Map<String, Value>> for Event {
    type Error = String;

    fn try_from(payload: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let class = payload
            .get(CLASS_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("event is missing a string `{CLASS_FIELD}`"))?
            .to_owned();
        Ok(Self { class, payload })
    }
}

impl From<Event> for Map<String, Value> {
    fn from(event: Event) -> Self {
        event.payload
    }
}

/// Unit of data received from the server on either transport.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session / server-instance identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boxid: Option<String>,
    /// Notifications in delivery order.
    #[serde(default)]
    pub messages: Vec<Event>,
}

impl Envelope {
    /// Parse an envelope from a frame or response body.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build an envelope.
    pub fn new(boxid: Option<String>, messages: Vec<Event>) -> Self {
        Self { boxid, messages }
    }

    /// Whether the envelope carries no notifications.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
