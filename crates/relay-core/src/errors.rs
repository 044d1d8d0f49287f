/// Errors raised while talking to the message broker.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("broker rejected session: {message}")]
    Rejected { message: String, detail: Option<String> },
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("connection closed")]
    Closed,
}

impl BrokerError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Rejected { .. } => "rejected",
            Self::Frame(_) => "frame",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Closed => "closed",
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(e.to_string())
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a port number, got {value:?}")]
    InvalidPort { var: &'static str, value: String },
}
