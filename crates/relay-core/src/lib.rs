pub mod broker;
pub mod classify;
pub mod config;
pub mod errors;
pub mod events;
pub mod state;

pub use broker::{subscription_id, BrokerClient, BrokerMessage, MessageStream, Subscription};
pub use classify::{classify, ClassifiedMessage};
pub use config::{BridgeConfig, BrokerConfig, DestinationRole, Destinations};
pub use errors::{BrokerError, ConfigError};
pub use events::{EventName, PushEvent};
pub use state::{LatestSnapshot, LatestState};
