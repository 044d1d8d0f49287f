use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{BrokerClient, BrokerError, BrokerMessage, Subscription};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type Item = Result<BrokerMessage, BrokerError>;

/// In-memory broker for tests. Messages are pushed through the paired
/// [`MockFeed`]; dropping the feed ends the subscription stream.
pub struct MockBroker {
    receiver: Mutex<Option<mpsc::Receiver<Item>>>,
    failure: Option<BrokerError>,
    subscribed: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

/// Producer side of a [`MockBroker`].
#[derive(Clone)]
pub struct MockFeed {
    tx: mpsc::Sender<Item>,
}

impl MockBroker {
    pub fn new() -> (Self, MockFeed) {
        let (tx, rx) = mpsc::channel(256);
        let broker = Self {
            receiver: Mutex::new(Some(rx)),
            failure: None,
            subscribed: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        };
        (broker, MockFeed { tx })
    }

    /// A broker whose stream yields `messages` in order and then ends.
    pub fn with_messages(messages: Vec<BrokerMessage>) -> Self {
        let (tx, rx) = mpsc::channel(messages.len().max(1));
        for msg in messages {
            // Capacity covers every message.
            let _ = tx.try_send(Ok(msg));
        }
        Self {
            receiver: Mutex::new(Some(rx)),
            failure: None,
            subscribed: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A broker that refuses every subscribe call with `error`.
    pub fn failing(error: BrokerError) -> Self {
        Self {
            receiver: Mutex::new(None),
            failure: Some(error),
            subscribed: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Destinations passed to the last successful subscribe call.
    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn subscribe(&self, destinations: &[String]) -> Result<Subscription, BrokerError> {
        let call = self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let rx = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| BrokerError::Protocol("mock broker supports one session".into()))?;
        *self.subscribed.lock() = destinations.to_vec();
        Ok(Subscription {
            session_id: format!("mock-session-{call}"),
            messages: Box::pin(ReceiverStream::new(rx)),
        })
    }
}

impl MockFeed {
    /// Deliver a message. Returns false once the subscriber is gone.
    pub async fn send(&self, destination: &str, body: &str) -> bool {
        self.tx
            .send(Ok(BrokerMessage::new(destination, body)))
            .await
            .is_ok()
    }

    /// Deliver a message tagged with a subscription id, as a broker that
    /// reports the matching subscription would.
    pub async fn send_on(&self, subscription: &str, destination: &str, body: &str) -> bool {
        self.tx
            .send(Ok(BrokerMessage::new(destination, body).with_subscription(subscription)))
            .await
            .is_ok()
    }

    /// Inject a terminal transport error.
    pub async fn fail(&self, error: BrokerError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }
}
