use futures::{SinkExt, StreamExt};
use relay_core::{BrokerConfig, BrokerError, BrokerMessage};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::frame::{Command, Frame, FrameError, StompCodec};

/// Credentials and virtual host sent in the CONNECT frame.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub host: String,
    pub login: String,
    pub passcode: SecretString,
}

impl From<&BrokerConfig> for ConnectOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            host: config.host.clone(),
            login: config.user.clone(),
            passcode: config.password.clone(),
        }
    }
}

impl From<FrameError> for BrokerError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(io) => BrokerError::Io(io.to_string()),
            other => BrokerError::Frame(other.to_string()),
        }
    }
}

/// An authenticated STOMP session over any byte stream.
pub struct StompConnection<T> {
    framed: Framed<T, StompCodec>,
    session_id: String,
    server: Option<String>,
    next_receipt: u64,
}

impl StompConnection<TcpStream> {
    /// Open a TCP connection to the broker and authenticate.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let addr = config.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| BrokerError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true).ok();
        Self::handshake(stream, &ConnectOptions::from(config)).await
    }
}

impl<T> StompConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Send CONNECT and wait for CONNECTED. An ERROR reply means the broker
    /// refused the session (usually bad credentials).
    pub async fn handshake(io: T, options: &ConnectOptions) -> Result<Self, BrokerError> {
        let mut framed = Framed::new(io, StompCodec::default());

        let connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", options.host.as_str())
            .header("login", options.login.as_str())
            .header("passcode", options.passcode.expose_secret())
            .header("heart-beat", "0,0");
        framed.send(connect).await?;

        let reply = match framed.next().await {
            Some(frame) => frame?,
            None => return Err(BrokerError::Closed),
        };

        match reply.command {
            Command::Connected => {
                let session_id = reply.get_header("session").unwrap_or_default().to_string();
                let server = reply.get_header("server").map(str::to_string);
                tracing::debug!(
                    session = %session_id,
                    server = server.as_deref().unwrap_or("unknown"),
                    version = reply.get_header("version").unwrap_or("1.0"),
                    "STOMP session established"
                );
                Ok(Self {
                    framed,
                    session_id,
                    server,
                    next_receipt: 1,
                })
            }
            Command::Error => Err(error_from_frame(&reply)),
            other => Err(BrokerError::Protocol(format!(
                "expected CONNECTED, got {other}"
            ))),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Register an auto-acknowledged subscription.
    pub async fn subscribe(&mut self, id: &str, destination: &str) -> Result<(), BrokerError> {
        let frame = Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto");
        self.framed.send(frame).await?;
        tracing::debug!(id, destination, "subscribed");
        Ok(())
    }

    /// Publish a text body.
    pub async fn send(
        &mut self,
        destination: &str,
        body: &str,
        content_type: &str,
    ) -> Result<(), BrokerError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", content_type)
            .header("content-length", body.len().to_string())
            .body(body.to_string());
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Wait for the next MESSAGE. RECEIPTs are skipped, an ERROR frame is
    /// returned as `Err`, end of stream yields `None`.
    pub async fn next_message(&mut self) -> Option<Result<BrokerMessage, BrokerError>> {
        loop {
            let frame = match self.framed.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame.command {
                Command::Message => {
                    let destination = frame.get_header("destination").unwrap_or_default();
                    let mut message = BrokerMessage::new(destination, frame.body_text());
                    message.subscription = frame.get_header("subscription").map(str::to_string);
                    return Some(Ok(message));
                }
                Command::Receipt => continue,
                Command::Error => return Some(Err(error_from_frame(&frame))),
                other => {
                    tracing::debug!(command = %other, "ignoring unexpected frame");
                }
            }
        }
    }

    /// Graceful DISCONNECT: waits for the broker's receipt so queued SENDs
    /// are known to be processed.
    pub async fn disconnect(mut self) -> Result<(), BrokerError> {
        let receipt_id = self.next_receipt.to_string();
        self.next_receipt += 1;
        self.framed
            .send(Frame::new(Command::Disconnect).header("receipt", receipt_id.as_str()))
            .await?;

        while let Some(frame) = self.framed.next().await {
            let frame = frame?;
            match frame.command {
                Command::Receipt if frame.get_header("receipt-id") == Some(receipt_id.as_str()) => {
                    return Ok(());
                }
                Command::Error => return Err(error_from_frame(&frame)),
                _ => {}
            }
        }
        Ok(())
    }
}

fn error_from_frame(frame: &Frame) -> BrokerError {
    let body = frame.body_text();
    BrokerError::Rejected {
        message: frame
            .get_header("message")
            .map(str::to_string)
            .unwrap_or_else(|| "unspecified broker error".into()),
        detail: (!body.is_empty()).then_some(body),
    }
}
