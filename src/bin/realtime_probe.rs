//! Realtime channel probe
//!
//! Connects to the collaboration server's realtime endpoint, logs every
//! inbound envelope and lifecycle event, and optionally sends a `probe`
//! envelope at a fixed interval. Ctrl+C closes the channel intentionally.
//!
//! Usage: realtime-probe [config.yaml]

use anyhow::{Context, Result};
use collab_realtime::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, ConfigType,
};
use collab_realtime::config::ProbeConfig;
use collab_realtime::realtime_channel::{
    self, envelope::CONNECTION_FAILED, ChannelEvent, ConnectionManager, Envelope,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_type = match parse_args().into_iter().next() {
        Some(path) => ConfigType::Custom(path),
        None => ConfigType::Probe,
    };
    let config_path = load_config_from_env(config_type);
    let config = ProbeConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing_with_level(&config.log_level);

    info!("");
    info!("========================================");
    info!("Starting realtime probe");
    info!("  url:      {}", config.url);
    info!("  identity: {}", config.user_id);
    info!("Press Ctrl+C to stop");
    info!("========================================");

    let channel = realtime_channel::builder()
        .url(config.url.clone())
        .identity(config.identity())
        .config(config.channel_config())
        .header("X-Client", "realtime-probe")
        .build()?;

    channel.on_unrouted(|envelope: &Envelope| -> realtime_channel::Result<()> {
        info!(
            event_type = envelope.event_type(),
            scope = ?envelope.scope(),
            payload = %envelope.payload(),
            "Inbound envelope"
        );
        Ok(())
    });
    channel.on(
        CONNECTION_FAILED,
        |envelope: &Envelope| -> realtime_channel::Result<()> {
            warn!(
                payload = %envelope.payload(),
                "Realtime unavailable, continuing offline"
            );
            Ok(())
        },
    );

    let running = Arc::new(AtomicBool::new(true));
    let event_printer = spawn_event_printer(&channel, Arc::clone(&running));

    let state = channel.connect().await;
    info!(%state, "Initial connect finished");

    let mut probe_ticker = config.probe.interval().map(tokio::time::interval);
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C)");
                break;
            }
            _ = tick(&mut probe_ticker) => {
                sequence += 1;
                channel.send("probe", config.probe.scope(), json!({ "sequence": sequence }));
            }
        }
    }

    channel.close();
    running.store(false, Ordering::Release);
    let _ = event_printer.join();

    let status = channel.status();
    info!("========================================");
    info!("Realtime probe stopped gracefully");
    info!(
        "sent={} received={} reconnects={} dropped={} queued={} events_dropped={}",
        status.metrics.messages_sent,
        status.metrics.messages_received,
        status.metrics.reconnect_count,
        status.metrics.dropped_count,
        status.queued_count,
        status.metrics.events_dropped
    );
    info!("========================================");

    Ok(())
}

/// Wait for the next probe tick, or forever when probing is disabled
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Log lifecycle events from a dedicated thread
fn spawn_event_printer(
    channel: &ConnectionManager,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let events = channel.events();
    std::thread::spawn(move || {
        while running.load(Ordering::Acquire) {
            match events.recv_timeout(Duration::from_millis(200)) {
                Ok(ChannelEvent::Diagnostic(diagnostic)) => warn!(%diagnostic, "Diagnostic"),
                Ok(event) => info!(?event, "Lifecycle event"),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}
