use std::sync::Arc;

use relay_core::PushEvent;

use crate::client::ClientRegistry;

/// Fan-out of push events to every connected client. Best effort: a slow or
/// closed client loses its copy and never blocks the others.
#[derive(Clone)]
pub struct FanoutNotifier {
    registry: Arc<ClientRegistry>,
}

impl FanoutNotifier {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize once and queue for every client. Returns how many clients
    /// the frame was queued for.
    pub fn broadcast(&self, event: &PushEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(event = %event.event, error = %e, "failed to serialize push event");
                return 0;
            }
        };
        let (queued, dropped) = self.registry.send_all(&json);
        tracing::debug!(event = %event.event, queued, dropped, "broadcast");
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::EventName;
    use serde_json::{json, Value};

    #[test]
    fn wire_frame_shape() {
        let registry = Arc::new(ClientRegistry::new(8));
        let (_id, mut rx) = registry.register();
        let notifier = FanoutNotifier::new(Arc::clone(&registry));

        let sent = notifier.broadcast(&PushEvent::new(
            EventName::SdrMessage,
            json!({"spectrum_db": [-40.0]}),
        ));
        assert_eq!(sent, 1);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"event": "sdr-message", "data": {"spectrum_db": [-40.0]}})
        );
    }

    #[test]
    fn no_clients_is_fine() {
        let notifier = FanoutNotifier::new(Arc::new(ClientRegistry::new(8)));
        assert_eq!(notifier.broadcast(&PushEvent::legacy("raw")), 0);
    }

    #[test]
    fn every_client_gets_a_copy() {
        let registry = Arc::new(ClientRegistry::new(8));
        let receivers: Vec<_> = (0..3).map(|_| registry.register().1).collect();
        let notifier = FanoutNotifier::new(Arc::clone(&registry));

        notifier.broadcast(&PushEvent::legacy("2024-01-01T12:00:00Z"));

        for mut rx in receivers {
            let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame["event"], "activemq-message");
            assert_eq!(frame["data"], "2024-01-01T12:00:00Z");
        }
    }
}
