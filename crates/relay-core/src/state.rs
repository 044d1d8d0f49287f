use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::classify::ClassifiedMessage;

/// Read-only view of the latest accepted messages, as served by `/latest`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LatestSnapshot {
    pub sdr: Option<Value>,
    pub publisher: Option<String>,
}

/// Holds the most recent message per category. Last arrival wins; embedded
/// timestamps are never compared.
#[derive(Debug, Default)]
pub struct LatestState {
    cells: Mutex<LatestSnapshot>,
}

impl LatestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cell matching the message category. Returns `false` for
    /// unrecognized messages, which leave both cells untouched.
    pub fn update(&self, message: &ClassifiedMessage) -> bool {
        match message {
            ClassifiedMessage::Spectrum(payload) => {
                self.cells.lock().sdr = Some(payload.clone());
                true
            }
            ClassifiedMessage::PublisherTimestamp(stamp) => {
                self.cells.lock().publisher = Some(stamp.clone());
                true
            }
            ClassifiedMessage::Unrecognized => false,
        }
    }

    pub fn snapshot(&self) -> LatestSnapshot {
        self.cells.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_snapshot_serializes_nulls() {
        let state = LatestState::new();
        let body = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(body, json!({"sdr": null, "publisher": null}));
    }

    #[test]
    fn spectrum_last_write_wins() {
        let state = LatestState::new();
        state.update(&ClassifiedMessage::PublisherTimestamp("2024-01-01T00:00:00Z".into()));
        state.update(&ClassifiedMessage::Spectrum(json!({"spectrum_db": 1, "timestamp": 2})));
        state.update(&ClassifiedMessage::Spectrum(json!({"spectrum_db": 3, "timestamp": 1})));

        let snap = state.snapshot();
        assert_eq!(snap.sdr, Some(json!({"spectrum_db": 3, "timestamp": 1})));
        assert_eq!(snap.publisher.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn publisher_last_write_wins_even_if_older() {
        let state = LatestState::new();
        state.update(&ClassifiedMessage::PublisherTimestamp("2030-01-01T00:00:00Z".into()));
        state.update(&ClassifiedMessage::PublisherTimestamp("2020-01-01T00:00:00Z".into()));
        assert_eq!(state.snapshot().publisher.as_deref(), Some("2020-01-01T00:00:00Z"));
        assert!(state.snapshot().sdr.is_none());
    }

    #[test]
    fn unrecognized_is_noop() {
        let state = LatestState::new();
        state.update(&ClassifiedMessage::Spectrum(json!({"spectrum_db": [1.0]})));
        let before = state.snapshot();

        assert!(!state.update(&ClassifiedMessage::Unrecognized));
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn concurrent_updates_do_not_tear() {
        let state = std::sync::Arc::new(LatestState::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = state.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        s.update(&ClassifiedMessage::Spectrum(json!({"spectrum_db": i * 1000 + j + 1})));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = state.snapshot();
        assert!(snap.sdr.unwrap()["spectrum_db"].as_i64().unwrap() > 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn message() -> impl Strategy<Value = ClassifiedMessage> {
            prop_oneof![
                any::<i64>().prop_map(|n| ClassifiedMessage::Spectrum(json!({ "spectrum_db": n }))),
                "[0-9:-]{0,10}T[0-9:.]{0,10}Z".prop_map(ClassifiedMessage::PublisherTimestamp),
                Just(ClassifiedMessage::Unrecognized),
            ]
        }

        proptest! {
            #[test]
            fn each_cell_holds_its_last_write(messages in proptest::collection::vec(message(), 0..32)) {
                let state = LatestState::new();
                let mut sdr = None;
                let mut publisher = None;
                for msg in &messages {
                    state.update(msg);
                    match msg {
                        ClassifiedMessage::Spectrum(v) => sdr = Some(v.clone()),
                        ClassifiedMessage::PublisherTimestamp(t) => publisher = Some(t.clone()),
                        ClassifiedMessage::Unrecognized => {}
                    }
                }
                prop_assert_eq!(state.snapshot(), LatestSnapshot { sdr, publisher });
            }

            #[test]
            fn spectrum_update_leaves_publisher(stamp in "[0-9]{4}T[0-9]{2}Z", x in any::<i64>(), y in any::<i64>()) {
                let state = LatestState::new();
                state.update(&ClassifiedMessage::PublisherTimestamp(stamp.clone()));
                state.update(&ClassifiedMessage::Spectrum(json!({ "spectrum_db": x })));
                state.update(&ClassifiedMessage::Spectrum(json!({ "spectrum_db": y })));

                let snap = state.snapshot();
                prop_assert_eq!(snap.sdr, Some(json!({ "spectrum_db": y })));
                prop_assert_eq!(snap.publisher, Some(stamp));
            }

            #[test]
            fn unrecognized_changes_nothing(messages in proptest::collection::vec(message(), 0..16)) {
                let state = LatestState::new();
                for msg in &messages {
                    state.update(msg);
                }
                let before = state.snapshot();
                prop_assert!(!state.update(&ClassifiedMessage::Unrecognized));
                prop_assert_eq!(state.snapshot(), before);
            }
        }
    }
}
