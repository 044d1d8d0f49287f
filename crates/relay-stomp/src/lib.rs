//! Minimal STOMP 1.2 client: frame codec, session handshake, and a
//! [`BrokerClient`](relay_core::BrokerClient) implementation over TCP.

pub mod client;
pub mod connection;
pub mod frame;
pub mod mock;

pub use client::StompClient;
pub use connection::{ConnectOptions, StompConnection};
pub use frame::{Command, Frame, FrameError, StompCodec};
pub use mock::{MockBroker, MockFeed};
