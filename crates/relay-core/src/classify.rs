use serde_json::Value;

/// Category of an inbound broker message, decided from the shape of its body.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedMessage {
    /// JSON object carrying a `spectrum_db` field.
    Spectrum(Value),
    /// ISO-8601 style timestamp string (`...T...Z`).
    PublisherTimestamp(String),
    Unrecognized,
}

impl ClassifiedMessage {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spectrum(_) => "spectrum",
            Self::PublisherTimestamp(_) => "publisher_timestamp",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Classify a raw message body.
///
/// JSON with a truthy `spectrum_db` wins over the timestamp shape; anything
/// else that contains `T` and ends in `Z` is a publisher timestamp.
pub fn classify(body: &str) -> ClassifiedMessage {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if parsed.get("spectrum_db").is_some_and(is_truthy) {
            return ClassifiedMessage::Spectrum(parsed);
        }
    }

    if body.contains('T') && body.ends_with('Z') {
        return ClassifiedMessage::PublisherTimestamp(body.to_string());
    }

    ClassifiedMessage::Unrecognized
}

/// JavaScript truthiness: arrays and objects are always truthy, even empty.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
