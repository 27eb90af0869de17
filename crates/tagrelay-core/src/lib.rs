//! Shared domain types for the tagrelay handheld RFID pipeline.
//!
//! This crate holds the types that cross crate boundaries: the reader
//! lifecycle states, tag events, EPC/TID filter specifications, delivery
//! connection states and the common error taxonomy. It contains no async
//! code and no I/O.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
