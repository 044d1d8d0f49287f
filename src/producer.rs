//! Test producers: push publisher timestamps or simulated spectra onto the
//! broker so the bridge has something to relay, plus a one-shot
//! connectivity check.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relay_core::BrokerConfig;
use relay_stomp::StompConnection;
use serde_json::{json, Value};

const CENTER_FREQ_HZ: f64 = 100e6;
const SAMPLE_RATE_HZ: f64 = 2.048e6;
const NOISE_FLOOR_DB: f64 = -90.0;

/// How often and how many times to publish.
#[derive(Clone, Copy, Debug)]
pub struct Schedule {
    pub interval: Duration,
    /// `None` runs until Ctrl-C.
    pub count: Option<u64>,
}

/// UTC time as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
pub fn utc_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Power spectrum in dB: a noisy floor with one to five peaks.
pub fn simulated_spectrum<R: Rng>(rng: &mut R, bins: usize) -> Vec<f64> {
    let mut spectrum: Vec<f64> = (0..bins)
        .map(|_| NOISE_FLOOR_DB + rng.gen_range(-3.0..3.0))
        .collect();

    if bins > 0 {
        let peaks = rng.gen_range(1..=5);
        for _ in 0..peaks {
            let pos = rng.gen_range(0..bins);
            spectrum[pos] += rng.gen_range(15.0..40.0);
        }
    }
    spectrum
}

/// JSON body for one simulated read.
pub fn sdr_message(read_number: u64, now: DateTime<Utc>, spectrum: Vec<f64>) -> Value {
    let peak_db = spectrum.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean_db = if spectrum.is_empty() {
        0.0
    } else {
        spectrum.iter().sum::<f64>() / spectrum.len() as f64
    };

    json!({
        "timestamp": now.timestamp_millis() as f64 / 1000.0,
        "type": "sample",
        "data": {
            "read_number": read_number,
            "sample_count": spectrum.len(),
            "mean_db": mean_db,
            "peak_db": if spectrum.is_empty() { Value::Null } else { json!(peak_db) },
        },
        "center_freq": CENTER_FREQ_HZ,
        "sample_rate": SAMPLE_RATE_HZ,
        "simulated": true,
        "spectrum_db": spectrum,
    })
}

/// JSON body of the connectivity check message.
pub fn connection_check_message(now: DateTime<Utc>) -> Value {
    json!({
        "timestamp": now.timestamp_millis() as f64 / 1000.0,
        "message": "Test message from local machine",
        "test": true,
    })
}

/// Connect, send one check message to `destination`, and disconnect.
pub async fn check_connection(broker: &BrokerConfig, destination: &str) -> Result<()> {
    tracing::info!(addr = %broker.addr(), "connecting to broker");
    let mut conn = StompConnection::connect(broker)
        .await
        .with_context(|| format!("failed to connect to broker at {}", broker.addr()))?;
    tracing::info!(session = %conn.session_id(), "connected to broker");

    let body = connection_check_message(Utc::now()).to_string();
    conn.send(destination, &body, "application/json")
        .await
        .context("failed to send test message")?;
    tracing::info!(destination, "test message sent");

    conn.disconnect().await.context("disconnect failed")?;
    tracing::info!("connection check passed");
    Ok(())
}

/// Send the current UTC time to `destination` on every tick.
pub async fn publish_time(
    broker: &BrokerConfig,
    destination: &str,
    schedule: Schedule,
) -> Result<u64> {
    run(broker, destination, "text/plain", schedule, |_| {
        utc_timestamp(Utc::now())
    })
    .await
}

/// Send simulated spectrum JSON to `destination` on every tick.
pub async fn simulate_sdr(
    broker: &BrokerConfig,
    destination: &str,
    bins: usize,
    schedule: Schedule,
) -> Result<u64> {
    let mut rng = StdRng::from_entropy();
    run(broker, destination, "application/json", schedule, move |n| {
        sdr_message(n, Utc::now(), simulated_spectrum(&mut rng, bins)).to_string()
    })
    .await
}

async fn run<F>(
    broker: &BrokerConfig,
    destination: &str,
    content_type: &str,
    schedule: Schedule,
    mut next_body: F,
) -> Result<u64>
where
    F: FnMut(u64) -> String,
{
    let mut conn = StompConnection::connect(broker)
        .await
        .with_context(|| format!("failed to connect to broker at {}", broker.addr()))?;
    tracing::info!(
        addr = %broker.addr(),
        destination,
        interval_ms = schedule.interval.as_millis() as u64,
        "producer connected"
    );

    let mut ticker = tokio::time::interval(schedule.interval);
    let mut sent: u64 = 0;

    loop {
        if schedule.count.is_some_and(|max| sent >= max) {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }

        let body = next_body(sent + 1);
        conn.send(destination, &body, content_type)
            .await
            .context("failed to send message")?;
        sent += 1;
        tracing::info!(seq = sent, len = body.len(), "sent");
        tracing::debug!(body = %truncate(&body, 120), "sent body");
    }

    conn.disconnect().await.context("disconnect failed")?;
    tracing::info!(sent, "producer finished");
    Ok(sent)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
