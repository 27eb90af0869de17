//! Hardware side of the tagrelay pipeline.
//!
//! This crate drives the physical RFID reader: it owns the vendor-SDK
//! boundary, the single-worker hardware channel that serializes every device
//! command and callback, the reader lifecycle state machine, EPC/TID filter
//! encoding, and the tag-event processor that turns raw detections into
//! deduplicated, rate-aware tag events.
//!
//! # Architecture
//!
//! ```text
//! vendor callback thread          callers (any task)
//!        │                               │
//!        ▼ RawDetection                  ▼ Command + oneshot reply
//! ┌──────────────────────────────────────────────┐
//! │              reader worker task              │
//! │  ReaderStateMachine ── AnyReader (the handle)│
//! └──────────────────┬───────────────────────────┘
//!                    │ validated detections
//!                    ▼
//!          TagEventProcessor
//!            ├── every-read stream (best-effort)
//!            └── first-seen stream (must-deliver)
//! ```
//!
//! Exactly one in-flight operation touches the reader handle at any time.
//! Vendor SDKs deliver callbacks from driver-owned threads and are not
//! documented as thread-safe, so both commands and callbacks are funneled
//! through the one worker task; public operations return once the worker has
//! completed (or abandoned) them.

pub mod channel;
pub mod filter;
pub mod mock;
pub mod processor;
pub mod state;
pub mod traits;

pub use tagrelay_core::{Error, Result};

pub use channel::{ReaderChannel, ReaderChannelConfig, ReaderHandle};
pub use filter::{clear_filter, company_filter, filter_for_value};
pub use processor::{TagEventProcessor, TagStreams};
pub use state::ReaderStateMachine;
pub use traits::{AnyReader, RfidReader};
