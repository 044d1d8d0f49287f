use std::path::PathBuf;

use secrecy::SecretString;

use crate::errors::ConfigError;

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 61613;
pub const DEFAULT_LEGACY_DEST: &str = "/queue/test";
pub const DEFAULT_SDR_DEST: &str = "/queue/sdr";
pub const DEFAULT_PUBLISHER_DEST: &str = "/queue/publisher";
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_PUBLIC_DIR: &str = "public";

/// Broker connection settings.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
}

impl BrokerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the bridge does with messages arriving on a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationRole {
    /// Pre-categorization queue: classified like the others, and also
    /// re-emitted raw as `activemq-message`.
    Legacy,
    Sdr,
    Publisher,
}

impl DestinationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Sdr => "sdr",
            Self::Publisher => "publisher",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destinations {
    pub legacy: String,
    pub sdr: String,
    pub publisher: String,
}

impl Destinations {
    /// Subscription order used at startup.
    pub fn all(&self) -> [(DestinationRole, &str); 3] {
        [
            (DestinationRole::Legacy, self.legacy.as_str()),
            (DestinationRole::Sdr, self.sdr.as_str()),
            (DestinationRole::Publisher, self.publisher.as_str()),
        ]
    }

    /// Resolve a destination name to its role. When two roles share a name
    /// the first one in subscription order wins.
    pub fn role_of(&self, destination: &str) -> Option<DestinationRole> {
        self.all()
            .into_iter()
            .find(|(_, d)| *d == destination)
            .map(|(role, _)| role)
    }
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            legacy: DEFAULT_LEGACY_DEST.into(),
            sdr: DEFAULT_SDR_DEST.into(),
            publisher: DEFAULT_PUBLISHER_DEST.into(),
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub destinations: Destinations,
    pub http_port: u16,
    pub public_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                host: DEFAULT_BROKER_HOST.into(),
                port: DEFAULT_BROKER_PORT,
                user: DEFAULT_USER.into(),
                password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            },
            destinations: Destinations::default(),
            http_port: DEFAULT_HTTP_PORT,
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
        }
    }
}

impl BridgeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup. Every
    /// variable falls back to its default independently.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).unwrap_or(default);

        Ok(Self {
            broker: BrokerConfig {
                host: var("ACTIVEMQ_HOST", defaults.broker.host),
                port: parse_port(&lookup, "ACTIVEMQ_PORT", defaults.broker.port)?,
                user: var("ACTIVEMQ_USER", defaults.broker.user),
                password: lookup("ACTIVEMQ_PASS")
                    .map(SecretString::from)
                    .unwrap_or(defaults.broker.password),
            },
            destinations: Destinations {
                legacy: var("ACTIVEMQ_DEST", defaults.destinations.legacy),
                sdr: var("ACTIVEMQ_SDR_DEST", defaults.destinations.sdr),
                publisher: var("ACTIVEMQ_PUBLISHER_DEST", defaults.destinations.publisher),
            },
            http_port: parse_port(&lookup, "PORT", defaults.http_port)?,
            public_dir: lookup("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
        })
    }
}

fn parse_port<F>(lookup: &F, var: &'static str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort { var, value: raw }),
    }
}
