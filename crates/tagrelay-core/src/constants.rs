//! Core constants for the tagrelay pipeline.
//!
//! Centralizes the filter-encoding layout, hardware operation deadlines,
//! watchdog timing defaults and the outbound topic namespace so that the
//! reader, delivery and composition-root crates agree on them.

// ============================================================================
// EPC filter layout
// ============================================================================

/// Start bit for EPC-bank company filters.
///
/// Company-prefix filters skip the EPC header words (2 × 16 bits) and match
/// from bit 32 onward. TID-bank filters match from bit 0.
pub const EPC_FILTER_START_BIT: u32 = 32;

/// Start bit for TID-bank filters.
pub const TID_FILTER_START_BIT: u32 = 0;

/// Constant header bit pattern prefixed to every company-prefix filter.
///
/// This is the SGTIN-96 EPC header byte; tags written by this system carry
/// it in front of the zero-padded company identifier.
pub const COMPANY_HEADER_BITS: &str = "00110000";

/// Bit width the numeric company identifier is zero-padded to before the
/// header is prefixed.
pub const COMPANY_ID_BIT_WIDTH: usize = 24;

// ============================================================================
// Hardware operation deadlines
// ============================================================================

/// Default deadline for a single hardware operation submitted to the reader
/// worker. On expiry the caller gets a timeout result; the operation itself
/// is abandoned, not force-killed.
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Connection watchdog defaults
// ============================================================================

/// Base interval between health checks while the channel is healthy.
pub const WATCHDOG_BASE_INTERVAL_MS: u64 = 30_000;

/// Backoff growth factor applied once failures pass the threshold.
pub const WATCHDOG_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper clamp for the check delay regardless of failure count.
pub const WATCHDOG_MAX_BACKOFF_MS: u64 = 600_000;

/// Consecutive failures tolerated at the base interval before backoff kicks in.
pub const WATCHDOG_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Settle time after a reconnection attempt before re-checking health.
pub const WATCHDOG_RECONNECT_GRACE_MS: u64 = 2_000;

// ============================================================================
// Delivery
// ============================================================================

/// Topic namespace for outbound tag reports; the device serial is appended.
pub const TOPIC_PREFIX: &str = "rfid/mobile/";

/// Antenna port reported in outbound payloads. Handheld readers have a
/// single integrated antenna.
pub const DEFAULT_ANTENNA_PORT: u8 = 1;
