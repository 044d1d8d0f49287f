use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::BrokerError;

/// A message delivered by the broker on one of our subscriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerMessage {
    pub destination: String,
    /// Id of the subscription that matched, when the transport reports one.
    pub subscription: Option<String>,
    pub body: String,
}

impl BrokerMessage {
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            subscription: None,
            body: body.into(),
        }
    }

    pub fn with_subscription(mut self, id: impl Into<String>) -> Self {
        self.subscription = Some(id.into());
        self
    }
}

/// Subscription id a transport assigns to the destination at `index` of the
/// list passed to [`BrokerClient::subscribe`].
pub fn subscription_id(index: usize) -> String {
    format!("sub-{index}")
}

/// Inbound messages, in arrival order. An `Err` item is terminal.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<BrokerMessage, BrokerError>> + Send>>;

/// An open broker session with its subscriptions registered.
pub struct Subscription {
    pub session_id: String,
    pub messages: MessageStream,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Trait implemented by broker transports (STOMP, in-memory mock).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open one session and subscribe to every destination, the one at
    /// index `i` under [`subscription_id`]`(i)`. Fails fast: no retry is
    /// attempted on connection or authentication errors.
    async fn subscribe(&self, destinations: &[String]) -> Result<Subscription, BrokerError>;
}
