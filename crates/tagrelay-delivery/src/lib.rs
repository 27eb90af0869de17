//! Delivery side of the tagrelay pipeline.
//!
//! Relays deduplicated tag events to the backend over MQTT and keeps that
//! channel alive on flaky local networks:
//!
//! - [`payload`]: the outbound JSON report model and topic layout.
//! - [`channel`]: [`DeliveryChannel`], the rumqttc wrapper owning
//!   connect/disconnect/publish and the observable [`ConnectionState`].
//! - [`discovery`]: the server-discovery collaborator boundary.
//! - [`watchdog`]: [`ConnectionWatchdog`], the independent health-check
//!   loop with capped exponential backoff.
//!
//! The data path and the repair path never meet: publishers call
//! [`DeliveryChannel::publish`] and get a boolean, while the watchdog
//! observes health and reconnects on its own schedule.
//!
//! [`ConnectionState`]: tagrelay_core::ConnectionState

pub mod channel;
pub mod discovery;
pub mod payload;
pub mod watchdog;

pub use channel::{DeliveryChannel, DeliveryChannelConfig};
pub use discovery::{ServerDiscovery, StaticDiscovery};
pub use payload::{TagInventoryEvent, TagReport, topic_for};
pub use watchdog::{ConnectionWatchdog, Supervised, WatchdogConfig, WatchdogPhase, WatchdogState};
