use serde::Serialize;
use serde_json::Value;

use crate::classify::ClassifiedMessage;

/// Event names emitted on the push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EventName {
    #[serde(rename = "sdr-message")]
    SdrMessage,
    #[serde(rename = "publisher-message")]
    PublisherMessage,
    /// Raw body re-emitted for every message on the legacy destination.
    #[serde(rename = "activemq-message")]
    ActiveMqMessage,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SdrMessage => "sdr-message",
            Self::PublisherMessage => "publisher-message",
            Self::ActiveMqMessage => "activemq-message",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One push-channel frame: `{"event": "...", "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushEvent {
    pub event: EventName,
    pub data: Value,
}

impl PushEvent {
    pub fn new(event: EventName, data: Value) -> Self {
        Self { event, data }
    }

    /// Categorized event for a classified message; `None` when unrecognized.
    pub fn from_classified(message: &ClassifiedMessage) -> Option<Self> {
        match message {
            ClassifiedMessage::Spectrum(payload) => {
                Some(Self::new(EventName::SdrMessage, payload.clone()))
            }
            ClassifiedMessage::PublisherTimestamp(stamp) => Some(Self::new(
                EventName::PublisherMessage,
                Value::String(stamp.clone()),
            )),
            ClassifiedMessage::Unrecognized => None,
        }
    }

    /// Legacy generic event carrying the raw body as a string.
    pub fn legacy(body: &str) -> Self {
        Self::new(EventName::ActiveMqMessage, Value::String(body.to_string()))
    }
}
