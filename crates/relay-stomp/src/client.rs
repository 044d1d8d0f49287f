use async_trait::async_trait;
use relay_core::{
    subscription_id, BrokerClient, BrokerConfig, BrokerError, BrokerMessage, Subscription,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::connection::StompConnection;

const INBOUND_QUEUE: usize = 1024;

/// [`BrokerClient`] backed by a single STOMP session over TCP.
#[derive(Clone, Debug)]
pub struct StompClient {
    config: BrokerConfig,
}

impl StompClient {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

#[async_trait]
impl BrokerClient for StompClient {
    async fn subscribe(&self, destinations: &[String]) -> Result<Subscription, BrokerError> {
        tracing::info!(addr = %self.config.addr(), user = %self.config.user, "connecting to broker");
        let mut conn = StompConnection::connect(&self.config).await?;

        for (i, destination) in destinations.iter().enumerate() {
            conn.subscribe(&subscription_id(i), destination).await?;
            tracing::info!(destination = %destination, "subscribed to destination");
        }

        let session_id = conn.session_id().to_string();
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        tokio::spawn(forward_messages(conn, tx));

        Ok(Subscription {
            session_id,
            messages: Box::pin(ReceiverStream::new(rx)),
        })
    }
}

/// Reader task: pump MESSAGE frames into the subscription channel until the
/// session ends, errors, or the subscriber goes away.
async fn forward_messages<T>(
    mut conn: StompConnection<T>,
    tx: mpsc::Sender<Result<BrokerMessage, BrokerError>>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    while let Some(item) = conn.next_message().await {
        let terminal = item.is_err();
        if tx.send(item).await.is_err() {
            tracing::debug!("subscriber dropped, closing broker session");
            return;
        }
        if terminal {
            return;
        }
    }
    tracing::info!(session = %conn.session_id(), "broker closed the session");
}
