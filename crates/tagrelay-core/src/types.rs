//! Domain types shared by the reader and delivery crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of the physical RFID reader.
///
/// Exactly one value is current at any time, held by the reader state
/// machine and mutated only through validated transitions. The UI renders
/// this value directly ("Scanning…", "Error").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderState {
    /// Process started, hardware not yet touched.
    Init,

    /// Vendor SDK init / power / frequency / filter configuration in flight.
    Configuring,

    /// Configured and idle; scan and write operations may start.
    Ready,

    /// Continuous inventory, tag hunt or single-read in progress.
    Scanning,

    /// EPC write in progress.
    Writing,

    /// Unrecoverable fault; terminal until reinitialization.
    Error,

    /// Orderly teardown toward `Sleeping`.
    ShuttingDown,

    /// Hardware released; only reconfiguration can wake the reader.
    Sleeping,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReaderState::Init => "Init",
            ReaderState::Configuring => "Configuring",
            ReaderState::Ready => "Ready",
            ReaderState::Scanning => "Scanning",
            ReaderState::Writing => "Writing",
            ReaderState::Error => "Error",
            ReaderState::ShuttingDown => "ShuttingDown",
            ReaderState::Sleeping => "Sleeping",
        };
        write!(f, "{}", s)
    }
}

/// Tag memory bank a filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBank {
    /// EPC bank (the rewritable identifier).
    Epc,

    /// TID bank (the factory-burned identifier).
    Tid,
}

impl fmt::Display for MemoryBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryBank::Epc => write!(f, "EPC"),
            MemoryBank::Tid => write!(f, "TID"),
        }
    }
}

/// Regulatory frequency plan applied to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyMode {
    /// Let the vendor firmware pick.
    Auto,

    /// FCC band (902-928 MHz).
    Us,

    /// ETSI band (865-868 MHz).
    Eu,

    /// SRRC band (920-925 MHz).
    Cn,
}

/// Hardware select-filter specification.
///
/// Immutable once applied; recomputed from the logical filter (company
/// prefix or partial EPC/TID) before every scan session. A zero-length spec
/// is the wire representation of "no filter on this bank"; clearing and
/// absence are the same operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpcFilterSpec {
    /// Bank the filter matches against.
    pub bank: MemoryBank,

    /// First bit of the match window within the bank.
    pub start_bit: u32,

    /// Match window length in bits. Zero clears the filter.
    pub bit_length: u32,

    /// Match value as whole hex bytes (always an even digit count).
    pub value_hex: String,
}

impl EpcFilterSpec {
    /// Whether this spec clears the filter rather than setting one.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.bit_length == 0
    }
}

/// One raw detection as delivered by the vendor SDK callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Factory-burned tag identifier, hex. Blank on partial/garbled reads.
    pub tid: String,

    /// EPC bank contents, hex.
    pub epc: String,

    /// Received signal strength, dBm.
    pub rssi: f64,

    /// Carrier frequency of the read, MHz.
    pub frequency: f32,
}

/// A deduplicated tag read within one scanning round.
///
/// Created on first detection of a TID; `seen_count` is bumped in place on
/// repeats within the same round. Never persisted beyond process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEvent {
    /// Tag identifier (TID bank), hex.
    pub tag_id: String,

    /// EPC bank contents, hex.
    pub epc: String,

    /// RSSI of the most recent detection, dBm.
    pub rssi: f64,

    /// Number of detections of this tag within the current round.
    pub seen_count: u32,

    /// Scanning round this event belongs to.
    pub round_id: i64,

    /// Carrier frequency, MHz. Dedup-map entries pin the first detection's
    /// value; per-read stream events carry the frequency of that read.
    pub frequency: f32,

    /// Transmit power active when the tag was read, dBm.
    pub power: i32,
}

/// Summary counters for the current scanning round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Monotonically incrementing round identifier.
    pub round_id: i64,

    /// Total detections this round, repeats included.
    pub tag_count: u64,

    /// Distinct tags this round (dedup map size).
    pub unique_count: usize,

    /// RSSI of the most recent detection.
    pub last_rssi: f64,
}

/// Connection lifecycle of the delivery channel.
///
/// Owned by the delivery channel and stored atomically so the watchdog and
/// UI can observe it without locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No usable connection; all candidates exhausted or torn down.
    Dead,

    /// Host has no network address yet.
    WaitingForIp,

    /// Channel constructed, no connection attempted.
    Init,

    /// Connection attempt in flight.
    Connecting,

    /// Broker acknowledged the connection; publishes may succeed.
    Connected,

    /// Transport fault observed; next health check decides recovery.
    Error,
}

impl ConnectionState {
    /// Stable `u8` encoding for atomic storage.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Dead => 0,
            ConnectionState::WaitingForIp => 1,
            ConnectionState::Init => 2,
            ConnectionState::Connecting => 3,
            ConnectionState::Connected => 4,
            ConnectionState::Error => 5,
        }
    }

    /// Decode the atomic representation. Unknown values map to `Dead`,
    /// which is the conservative reading for a corrupted state.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::WaitingForIp,
            2 => ConnectionState::Init,
            3 => ConnectionState::Connecting,
            4 => ConnectionState::Connected,
            5 => ConnectionState::Error,
            _ => ConnectionState::Dead,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Dead => "Dead",
            ConnectionState::WaitingForIp => "WaitingForIp",
            ConnectionState::Init => "Init",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        };
        write!(f, "{}", s)
    }
}
