//! # sdr-relay
//!
//! Bridge binary: subscribes to the broker queues, keeps the latest SDR and
//! publisher messages, and pushes them to WebSocket viewers.

#![deny(unsafe_code)]

mod producer;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_core::{BridgeConfig, LatestState};
use relay_server::{AppState, Ingestor, ServerConfig};
use relay_stomp::StompClient;
use relay_telemetry::{init_telemetry, TelemetryConfig};

use crate::producer::Schedule;

/// STOMP to WebSocket relay for SDR spectra and publisher timestamps.
#[derive(Parser, Debug)]
#[command(name = "sdr-relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default).
    Serve,
    /// Publish the current UTC time to the publisher destination.
    PublishTime {
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
        /// Stop after this many messages.
        #[arg(long)]
        count: Option<u64>,
    },
    /// Publish simulated spectrum readings to the SDR destination.
    SimulateSdr {
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
        /// FFT bins per reading.
        #[arg(long, default_value_t = 1024)]
        bins: usize,
        #[arg(long)]
        count: Option<u64>,
    },
    /// Connect, send one test message to the SDR destination, and disconnect.
    CheckConnection,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv().ok();
    init_telemetry(&TelemetryConfig::from_env());
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    match run(cli.command.unwrap_or(Command::Serve)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "sdr-relay failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let config = BridgeConfig::from_env().context("invalid configuration")?;

    match command {
        Command::Serve => serve(config).await,
        Command::PublishTime { interval_ms, count } => {
            let schedule = Schedule {
                interval: Duration::from_millis(interval_ms),
                count,
            };
            producer::publish_time(&config.broker, &config.destinations.publisher, schedule)
                .await
                .map(|_| ())
        }
        Command::SimulateSdr {
            interval_ms,
            bins,
            count,
        } => {
            let schedule = Schedule {
                interval: Duration::from_millis(interval_ms),
                count,
            };
            producer::simulate_sdr(&config.broker, &config.destinations.sdr, bins, schedule)
                .await
                .map(|_| ())
        }
        Command::CheckConnection => {
            producer::check_connection(&config.broker, &config.destinations.sdr).await
        }
    }
}

async fn serve(config: BridgeConfig) -> Result<()> {
    tracing::info!(
        broker = %config.broker.addr(),
        legacy = %config.destinations.legacy,
        sdr = %config.destinations.sdr,
        publisher = %config.destinations.publisher,
        "starting sdr-relay"
    );

    let server_config = ServerConfig {
        port: config.http_port,
        public_dir: config.public_dir.clone(),
        ..Default::default()
    };
    let latest = Arc::new(LatestState::new());
    let app_state = AppState::new(Arc::clone(&latest), server_config.max_send_queue);
    let ingestor = Ingestor::new(latest, app_state.notifier(), config.destinations.clone());

    // One attempt; a broker that is down or rejects us ends the process.
    let broker = StompClient::new(config.broker.clone());
    let subscription = ingestor
        .connect(&broker)
        .await
        .with_context(|| format!("failed to connect to broker at {}", config.broker.addr()))?;
    let _ingest = ingestor.spawn(subscription);

    let handle = relay_server::start(server_config, app_state)
        .await
        .with_context(|| format!("failed to bind HTTP port {}", config.http_port))?;
    tracing::info!(url = %format!("http://localhost:{}", handle.port), "sdr-relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
