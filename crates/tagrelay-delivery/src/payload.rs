//! Outbound message payload model.
//!
//! One JSON object per tag read the application chooses to forward,
//! published on `rfid/mobile/<device-serial>` with at-least-once QoS.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagrelay_core::constants::{DEFAULT_ANTENNA_PORT, TOPIC_PREFIX};
use tagrelay_core::{Error, Result, TagEvent};

/// Event type discriminator carried by every report.
pub const EVENT_TYPE_TAG_INVENTORY: &str = "tagInventory";

/// Publish topic for a device serial.
#[must_use]
pub fn topic_for(device_serial: &str) -> String {
    format!("{TOPIC_PREFIX}{device_serial}")
}

/// Envelope of one outbound tag read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReport {
    /// ISO-8601 instant of report creation.
    pub timestamp: DateTime<Utc>,

    /// Device serial of the handheld that produced the read.
    pub hostname: String,

    /// Always [`EVENT_TYPE_TAG_INVENTORY`].
    pub event_type: String,

    /// The read itself.
    pub tag_inventory_event: TagInventoryEvent,
}

/// Body of one tag read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInventoryEvent {
    /// Raw TID bytes, base64.
    pub tid: String,

    /// TID, hex.
    pub tid_hex: String,

    /// EPC bank contents, hex.
    pub epc: String,

    /// Antenna the read came from; handhelds have one.
    pub antenna_port: u8,

    /// Human-readable antenna label.
    pub antenna_name: String,

    /// RSSI in centi-dBm (dBm × 100).
    pub peak_rssi_cdbm: i32,

    /// Carrier frequency in kHz.
    pub frequency: i32,

    /// Transmit power in centi-dBm (dBm × 100).
    pub transmit_power_cdbm: i32,
}

impl TagReport {
    /// Build a report from a deduplicated tag event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTag`] when the event's TID is not decodable
    /// hex. Such an event should never have passed the processor's blank
    /// check, so the caller can only log and drop it.
    pub fn from_event(
        event: &TagEvent,
        device_serial: &str,
        antenna_name: &str,
    ) -> Result<Self> {
        let tid_bytes = hex::decode(&event.tag_id)
            .map_err(|e| Error::invalid_tag(format!("TID {:?} is not hex: {e}", event.tag_id)))?;

        Ok(Self {
            timestamp: Utc::now(),
            hostname: device_serial.to_string(),
            event_type: EVENT_TYPE_TAG_INVENTORY.to_string(),
            tag_inventory_event: TagInventoryEvent {
                tid: BASE64.encode(&tid_bytes),
                tid_hex: event.tag_id.clone(),
                epc: event.epc.clone(),
                antenna_port: DEFAULT_ANTENNA_PORT,
                antenna_name: antenna_name.to_string(),
                peak_rssi_cdbm: (event.rssi * 100.0).round() as i32,
                frequency: (f64::from(event.frequency) * 1000.0).round() as i32,
                transmit_power_cdbm: event.power * 100,
            },
        })
    }

    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTag`] when serialization fails; with this
    /// model that indicates a programmer error upstream.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::invalid_tag(format!("unserializable report: {e}")))
    }
}
