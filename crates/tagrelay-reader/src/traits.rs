//! Vendor reader SDK boundary.
//!
//! The [`RfidReader`] trait is the contract between the hardware channel and
//! whatever vendor SDK actually drives the radio. It mirrors the command
//! surface the pipeline needs (init/free, power, frequency plan, read bank,
//! select filter, inventory start/stop, single-tag read, EPC write) without
//! redefining vendor register values.
//!
//! Continuous-inventory detections are not returned from trait methods: real
//! SDKs deliver them as callbacks on driver-owned threads. Implementations
//! receive an `mpsc::Sender<RawDetection>` at construction and forward each
//! callback as a channel send, so hardware-touching logic never executes on
//! the callback thread.
//!
//! All traits use native `async fn` methods (Edition 2024 RPITIT).

#![allow(async_fn_in_trait)]

use tagrelay_core::{EpcFilterSpec, FrequencyMode, MemoryBank, RawDetection, Result};

use crate::mock::MockReader;

/// Command surface of a UHF RFID reader module.
///
/// Implementations are owned exclusively by the reader worker task; methods
/// take `&mut self` and are never called concurrently.
pub trait RfidReader: Send {
    /// Initialize the radio. Must be called before any other operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is absent or the SDK init call fails.
    async fn init(&mut self) -> Result<()>;

    /// Release the radio. The reader is unusable until `init` succeeds again.
    async fn free(&mut self) -> Result<()>;

    /// Set transmit power in dBm-like vendor units.
    async fn set_power(&mut self, dbm: i32) -> Result<()>;

    /// Select the regulatory frequency plan.
    async fn set_frequency_mode(&mut self, mode: FrequencyMode) -> Result<()>;

    /// Select which memory bank inventory reads report.
    async fn set_read_bank(&mut self, bank: MemoryBank) -> Result<()>;

    /// Apply a select filter. A zero-length spec clears the filter on that
    /// bank; "filter absent" and "filter cleared" are the same wire call.
    async fn apply_filter(&mut self, spec: &EpcFilterSpec) -> Result<()>;

    /// Start continuous inventory. Detections flow on the detection channel
    /// handed to the implementation at construction.
    async fn start_inventory(&mut self) -> Result<()>;

    /// Stop continuous inventory. Idempotent.
    async fn stop_inventory(&mut self) -> Result<()>;

    /// Attempt one single-shot read. `None` means no tag answered within the
    /// module's own read window.
    async fn read_single_tag(&mut self) -> Result<Option<RawDetection>>;

    /// Write a new EPC to the tag addressed by `target` (typically a
    /// TID-bank filter so exactly one tag is selected).
    async fn write_epc(&mut self, target: &EpcFilterSpec, new_epc_hex: &str) -> Result<()>;
}

/// Enum wrapper for reader dispatch.
///
/// Native `async fn` in traits is not object-safe, so the worker cannot hold
/// a `Box<dyn RfidReader>`. The enum provides concrete dispatch instead and
/// leaves room for real vendor backends behind feature flags.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReader {
    /// Mock reader for development and testing.
    Mock(MockReader),
    // Real vendor backends (UART/USB module drivers) slot in here behind
    // the hardware-* feature flags.
}

impl RfidReader for AnyReader {
    async fn init(&mut self) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.init().await,
        }
    }

    async fn free(&mut self) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.free().await,
        }
    }

    async fn set_power(&mut self, dbm: i32) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.set_power(dbm).await,
        }
    }

    async fn set_frequency_mode(&mut self, mode: FrequencyMode) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.set_frequency_mode(mode).await,
        }
    }

    async fn set_read_bank(&mut self, bank: MemoryBank) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.set_read_bank(bank).await,
        }
    }

    async fn apply_filter(&mut self, spec: &EpcFilterSpec) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.apply_filter(spec).await,
        }
    }

    async fn start_inventory(&mut self) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.start_inventory().await,
        }
    }

    async fn stop_inventory(&mut self) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.stop_inventory().await,
        }
    }

    async fn read_single_tag(&mut self) -> Result<Option<RawDetection>> {
        match self {
            Self::Mock(reader) => reader.read_single_tag().await,
        }
    }

    async fn write_epc(&mut self, target: &EpcFilterSpec, new_epc_hex: &str) -> Result<()> {
        match self {
            Self::Mock(reader) => reader.write_epc(target, new_epc_hex).await,
        }
    }
}
