use std::sync::Arc;

use futures::StreamExt;
use relay_core::{
    classify, subscription_id, BrokerClient, BrokerError, BrokerMessage, ClassifiedMessage,
    DestinationRole, Destinations, LatestState, PushEvent, Subscription,
};

use crate::notifier::FanoutNotifier;

/// Connects the broker subscription to the latest-value store and the push
/// channel: classify, update, broadcast.
#[derive(Clone)]
pub struct Ingestor {
    state: Arc<LatestState>,
    notifier: FanoutNotifier,
    destinations: Destinations,
}

impl Ingestor {
    pub fn new(
        state: Arc<LatestState>,
        notifier: FanoutNotifier,
        destinations: Destinations,
    ) -> Self {
        Self {
            state,
            notifier,
            destinations,
        }
    }

    /// Destinations to subscribe, in order, with duplicates removed.
    pub fn subscription_list(&self) -> Vec<String> {
        let mut list: Vec<String> = Vec::with_capacity(3);
        for (_, dest) in self.destinations.all() {
            if !list.iter().any(|d| d == dest) {
                list.push(dest.to_string());
            }
        }
        list
    }

    /// Open the single broker session. Errors are returned untouched; the
    /// caller decides that they are fatal.
    pub async fn connect(&self, broker: &dyn BrokerClient) -> Result<Subscription, BrokerError> {
        let destinations = self.subscription_list();
        let subscription = broker.subscribe(&destinations).await?;
        tracing::info!(
            session = %subscription.session_id,
            destinations = ?destinations,
            "broker session ready"
        );
        Ok(subscription)
    }

    /// Role of the destination a message arrived on, looked up by
    /// subscription id. Messages without one are matched by destination name.
    pub fn role_for(&self, message: &BrokerMessage) -> Option<DestinationRole> {
        match &message.subscription {
            Some(id) => self
                .subscription_list()
                .iter()
                .enumerate()
                .find(|(i, _)| subscription_id(*i) == *id)
                .and_then(|(_, dest)| self.destinations.role_of(dest)),
            None => self.destinations.role_of(&message.destination),
        }
    }

    /// Process one inbound message.
    pub fn handle(&self, message: &BrokerMessage) -> ClassifiedMessage {
        let role = self.role_for(message);
        let classified = classify(&message.body);

        match PushEvent::from_classified(&classified) {
            Some(event) => {
                self.state.update(&classified);
                self.notifier.broadcast(&event);
                tracing::debug!(
                    destination = %message.destination,
                    kind = classified.kind(),
                    "message accepted"
                );
            }
            None => {
                tracing::debug!(
                    destination = %message.destination,
                    len = message.body.len(),
                    "unrecognized message body"
                );
            }
        }

        if role == Some(DestinationRole::Legacy) {
            self.notifier.broadcast(&PushEvent::legacy(&message.body));
        } else if role.is_none() {
            tracing::debug!(destination = %message.destination, "message from unmapped destination");
        }

        classified
    }

    /// Consume the subscription until it ends. Returns the terminal error,
    /// if the stream ended with one.
    pub async fn run(self, subscription: Subscription) -> Option<BrokerError> {
        let mut messages = subscription.messages;
        let mut count: u64 = 0;

        while let Some(item) = messages.next().await {
            match item {
                Ok(message) => {
                    self.handle(&message);
                    count += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        error_kind = e.error_kind(),
                        processed = count,
                        "broker stream failed, ingestion stopped"
                    );
                    return Some(e);
                }
            }
        }

        tracing::warn!(processed = count, "broker stream ended, ingestion stopped");
        None
    }

    /// Run the ingestion loop on its own task.
    pub fn spawn(self, subscription: Subscription) -> tokio::task::JoinHandle<Option<BrokerError>> {
        tokio::spawn(self.run(subscription))
    }
}
