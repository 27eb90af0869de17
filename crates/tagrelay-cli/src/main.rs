//! tagrelay demo binary.
//!
//! Wires the full pipeline against the mock reader backend: a scripted set
//! of tag sightings flows through the reader worker and the dedup
//! processor, first-seen events become JSON reports on the MQTT delivery
//! channel, and the watchdog supervises that channel until ctrl-c.
//!
//! Configuration is environment-driven:
//!
//! - `TAGRELAY_BROKERS`: comma-separated `host:port` candidates
//!   (default `localhost:1883`)
//! - `TAGRELAY_SERIAL`: reader serial used in the topic
//!   (default `demo-reader`)
//! - `RUST_LOG`: tracing filter (default `info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tagrelay_delivery::{
    ConnectionWatchdog, DeliveryChannel, DeliveryChannelConfig, StaticDiscovery, TagReport,
    WatchdogConfig, topic_for,
};
use tagrelay_reader::mock::MockReader;
use tagrelay_reader::{ReaderChannel, ReaderChannelConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let brokers: Vec<String> = std::env::var("TAGRELAY_BROKERS")
        .unwrap_or_else(|_| "localhost:1883".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let serial = std::env::var("TAGRELAY_SERIAL").unwrap_or_else(|_| "demo-reader".to_string());
    let topic = topic_for(&serial);

    info!(?brokers, serial, "starting tagrelay");

    // Reader side: mock backend feeding the single-worker channel.
    let (detections_tx, detections_rx) = mpsc::channel(64);
    let (reader, reader_ctl) = MockReader::new(detections_tx);
    let (handle, streams, _worker) = ReaderChannel::spawn(
        tagrelay_reader::AnyReader::Mock(reader),
        detections_rx,
        ReaderChannelConfig::default(),
    );

    handle
        .initialize()
        .await
        .context("reader initialization failed")?;
    handle
        .start_continuous_scan(None)
        .await
        .context("could not start scanning")?;

    // Delivery side: MQTT channel plus its watchdog.
    let channel = Arc::new(DeliveryChannel::new(DeliveryChannelConfig {
        client_id: format!("tagrelay-{serial}"),
        ..DeliveryChannelConfig::default()
    }));
    let discovery = Arc::new(StaticDiscovery::new(brokers.clone()));
    if !channel.connect(&brokers).await {
        warn!("no broker reachable yet; the watchdog will keep trying");
    }
    let watchdog = ConnectionWatchdog::new(
        Arc::clone(&channel),
        discovery,
        WatchdogConfig::default(),
    );
    watchdog.start();

    // Forward first-seen events as reports. Every-read stays local; the
    // demo just logs its volume.
    let tagrelay_reader::TagStreams {
        mut every_read,
        mut first_seen,
    } = streams;
    let publisher_channel = Arc::clone(&channel);
    let publisher_serial = serial.clone();
    tokio::spawn(async move {
        while let Some(event) = first_seen.recv().await {
            match TagReport::from_event(&event, &publisher_serial, "antenna-1") {
                Ok(report) => match report.to_bytes() {
                    Ok(bytes) => {
                        if !publisher_channel.publish(&bytes, &topic) {
                            warn!(tag = %event.tag_id, "report not delivered");
                        }
                    }
                    Err(e) => warn!(tag = %event.tag_id, error = %e, "report serialization failed"),
                },
                Err(e) => warn!(tag = %event.tag_id, error = %e, "unreportable tag"),
            }
        }
    });
    tokio::spawn(async move {
        let mut reads: u64 = 0;
        while every_read.recv().await.is_some() {
            reads += 1;
            if reads.is_multiple_of(100) {
                info!(reads, "raw read volume");
            }
        }
    });

    // Scripted sightings: two tags, one of them seen repeatedly.
    tokio::spawn(async move {
        let mut round = 0u32;
        loop {
            reader_ctl
                .present_tag("E28011702000", "3034F4C20D8000000000AAAA", -48.5, 915.25)
                .await;
            reader_ctl
                .present_tag("E28011702000", "3034F4C20D8000000000AAAA", -52.0, 915.25)
                .await;
            if round.is_multiple_of(3) {
                reader_ctl
                    .present_tag("E28011702001", "3034F4C20D8000000000BBBB", -61.0, 902.75)
                    .await;
            }
            round += 1;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    watchdog.stop().await;
    channel.disconnect().await;
    if let Err(e) = handle.stop_continuous_scan().await {
        warn!(error = %e, "stop scan failed");
    }
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "reader shutdown failed");
    }

    let summary = handle.processor().summary();
    info!(
        reads = summary.tag_count,
        unique = summary.unique_count,
        "final round summary"
    );
    Ok(())
}
