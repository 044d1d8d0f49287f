pub mod client;
pub mod handlers;
pub mod ingest;
pub mod notifier;
pub mod server;

pub use client::{ClientId, ClientRegistry};
pub use ingest::Ingestor;
pub use notifier::FanoutNotifier;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
