//! MQTT delivery channel.
//!
//! Owns the publish connection lifecycle (connect, disconnect, publish)
//! and reports [`ConnectionState`]. Transport faults never propagate to
//! callers: a failed connect or publish is reflected as a state transition
//! (`Dead`/`Error`) and a `false` return, and callers decide on their own
//! QoS grounds whether to retry or drop.
//!
//! The state cell is a plain atomic: the background event-loop task writes
//! it, publishers and the watchdog read it without locking.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tagrelay_core::ConnectionState;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watchdog::Supervised;

/// Default MQTT port when a candidate lacks one.
const DEFAULT_MQTT_PORT: u16 = 1883;

/// Configuration for the delivery channel.
#[derive(Debug, Clone)]
pub struct DeliveryChannelConfig {
    /// MQTT client identifier; brokers deduplicate sessions on it.
    pub client_id: String,

    /// Transport keep-alive interval.
    pub keep_alive: Duration,

    /// How long one candidate gets to produce a ConnAck before the next
    /// candidate is tried.
    pub connect_timeout: Duration,

    /// Topic the deep health probe publishes to (QoS 0, empty payload).
    pub health_topic: String,

    /// Settle time after the health probe before re-reading the state.
    pub probe_grace: Duration,
}

impl Default for DeliveryChannelConfig {
    fn default() -> Self {
        Self {
            client_id: "tagrelay".to_string(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            health_topic: "rfid/mobile/health".to_string(),
            probe_grace: Duration::from_millis(100),
        }
    }
}

struct ActiveConnection {
    client: AsyncClient,
    event_loop_task: JoinHandle<()>,
}

/// Wrapper around the MQTT client owning connect/disconnect/publish.
pub struct DeliveryChannel {
    config: DeliveryChannelConfig,
    state: Arc<AtomicU8>,
    active: Mutex<Option<ActiveConnection>>,
}

impl DeliveryChannel {
    /// Create a channel in the `Init` state; nothing is connected yet.
    #[must_use]
    pub fn new(config: DeliveryChannelConfig) -> Self {
        Self {
            config,
            state: Arc::new(AtomicU8::new(ConnectionState::Init.as_u8())),
            active: Mutex::new(None),
        }
    }

    /// Current connection state.
    ///
    /// This channel produces `Init`, `Connecting`, `Connected`, `Error` and
    /// `Dead`. `WaitingForIp` is reserved for a platform network monitor
    /// that gates connecting until the host has an address; nothing in this
    /// crate stores it.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a publish has a chance of succeeding right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Attempt the candidate servers in order.
    ///
    /// Transitions `Connecting → Connected` on the first broker that
    /// acknowledges, `Dead` when the list is exhausted. Any previous
    /// connection is torn down first. Returns whether a broker was reached.
    pub async fn connect(&self, candidate_servers: &[String]) -> bool {
        self.disconnect().await;

        if candidate_servers.is_empty() {
            warn!("no candidate servers to connect to");
            self.store_state(ConnectionState::Dead);
            return false;
        }

        self.store_state(ConnectionState::Connecting);

        for server in candidate_servers {
            let (host, port) = split_host_port(server);
            debug!(host, port, "attempting broker");

            let mut options = MqttOptions::new(&self.config.client_id, host, port);
            options.set_keep_alive(self.config.keep_alive);

            let (client, mut event_loop) = AsyncClient::new(options, 64);
            let (ack_tx, ack_rx) = oneshot::channel::<bool>();
            let state = Arc::clone(&self.state);
            let server_label = server.clone();

            let event_loop_task = tokio::spawn(async move {
                let mut ack_tx = Some(ack_tx);
                loop {
                    match event_loop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            state.store(ConnectionState::Connected.as_u8(), Ordering::Release);
                            if let Some(tx) = ack_tx.take() {
                                let _ = tx.send(true);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Before the first ConnAck this candidate just
                            // failed; after it, the live connection broke.
                            match ack_tx.take() {
                                Some(tx) => {
                                    debug!(server = %server_label, error = %e, "candidate failed");
                                    let _ = tx.send(false);
                                }
                                None => {
                                    warn!(server = %server_label, error = %e, "connection lost");
                                    state.store(
                                        ConnectionState::Error.as_u8(),
                                        Ordering::Release,
                                    );
                                }
                            }
                            break;
                        }
                    }
                }
            });

            let acked =
                match tokio::time::timeout(self.config.connect_timeout, ack_rx).await {
                    Ok(Ok(acked)) => acked,
                    _ => false,
                };

            if acked {
                info!(server = %server, "delivery channel connected");
                let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
                *active = Some(ActiveConnection {
                    client,
                    event_loop_task,
                });
                return true;
            }

            // A ConnAck racing the timeout may have stored Connected for a
            // client we are about to discard. Wait the task out, then put
            // the state back before the next candidate.
            event_loop_task.abort();
            let _ = event_loop_task.await;
            self.store_state(ConnectionState::Connecting);
        }

        warn!("all candidate servers exhausted");
        self.store_state(ConnectionState::Dead);
        false
    }

    /// Publish `payload` on `topic` with at-least-once QoS.
    ///
    /// Returns `false`, never an error, when not connected or when the
    /// transport rejects the message; a rejection also moves the state to
    /// `Error` for the watchdog to repair.
    pub fn publish(&self, payload: &[u8], topic: &str) -> bool {
        if !self.is_connected() {
            return false;
        }

        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let Some(connection) = active.as_ref() else {
            return false;
        };

        match connection
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
        {
            Ok(()) => true,
            Err(e) => {
                warn!(topic, error = %e, "publish rejected");
                self.store_state(ConnectionState::Error);
                false
            }
        }
    }

    /// Tear down any live connection. Idempotent.
    pub async fn disconnect(&self) {
        let connection = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.take()
        };

        if let Some(connection) = connection {
            // Best-effort clean disconnect; the broker will drop us anyway.
            let _ = connection.client.try_disconnect();
            connection.event_loop_task.abort();
            self.store_state(ConnectionState::Dead);
            debug!("delivery channel disconnected");
        }
    }

    /// Deep health probe: push a QoS0 heartbeat through the transport and
    /// confirm the connection did not flip underneath it.
    pub async fn check_connection(&self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let probe_sent = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            match active.as_ref() {
                Some(connection) => connection
                    .client
                    .try_publish(&self.config.health_topic, QoS::AtMostOnce, false, Vec::new())
                    .is_ok(),
                None => false,
            }
        };
        if !probe_sent {
            return false;
        }

        tokio::time::sleep(self.config.probe_grace).await;
        self.is_connected()
    }

    fn store_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl Supervised for DeliveryChannel {
    fn is_connected(&self) -> bool {
        DeliveryChannel::is_connected(self)
    }

    async fn check_connection(&self) -> bool {
        DeliveryChannel::check_connection(self).await
    }

    async fn reconnect(&self, servers: &[String]) -> bool {
        self.connect(servers).await
    }
}

/// Split `host:port`, defaulting the port when absent or malformed.
fn split_host_port(server: &str) -> (String, u16) {
    match server.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (server.to_string(), DEFAULT_MQTT_PORT),
        },
        None => (server.to_string(), DEFAULT_MQTT_PORT),
    }
}
