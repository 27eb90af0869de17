//! EPC/TID select-filter encoding.
//!
//! Translates a logical filter (a company prefix or a partial tag EPC/TID)
//! into the bit-offset / bit-length / hex-value triple the reader hardware
//! expects. The hardware filter API takes whole bytes, so every encoded
//! value carries an even number of hex digits.
//!
//! Clearing a filter is not a special flag: it is a zero-length filter
//! applied to the same bank, so "filter absent" and "filter explicitly
//! cleared" are the same wire operation.

use tagrelay_core::constants::{
    COMPANY_HEADER_BITS, COMPANY_ID_BIT_WIDTH, EPC_FILTER_START_BIT, TID_FILTER_START_BIT,
};
use tagrelay_core::{EpcFilterSpec, Error, MemoryBank, Result};

/// Build a filter matching `value_hex` on the given bank.
///
/// EPC-bank filters match past the EPC header words (start bit 32); TID-bank
/// filters match from bit 0. The match length is `4 × hex digits`.
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] when `value_hex` is empty or contains a
/// non-hex digit. Use [`clear_filter`] for the empty case.
///
/// # Examples
///
/// ```
/// use tagrelay_reader::filter_for_value;
/// use tagrelay_core::MemoryBank;
///
/// let spec = filter_for_value(MemoryBank::Tid, "E2801160").unwrap();
/// assert_eq!(spec.start_bit, 0);
/// assert_eq!(spec.bit_length, 32);
/// ```
pub fn filter_for_value(bank: MemoryBank, value_hex: &str) -> Result<EpcFilterSpec> {
    if value_hex.is_empty() {
        return Err(Error::invalid_filter("empty filter value; use clear_filter"));
    }
    if !value_hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::invalid_filter(format!(
            "non-hex digit in filter value {value_hex:?}"
        )));
    }

    let bit_length = 4 * value_hex.len() as u32;
    let value_hex = if value_hex.len() % 2 == 0 {
        value_hex.to_ascii_uppercase()
    } else {
        // Whole-byte API: pad a trailing zero nibble. The bit length still
        // reflects only the caller's digits, so the pad never matches.
        let mut padded = value_hex.to_ascii_uppercase();
        padded.push('0');
        padded
    };

    Ok(EpcFilterSpec {
        bank,
        start_bit: start_bit_for(bank),
        bit_length,
        value_hex,
    })
}

/// Build the zero-length spec that clears any filter on `bank`.
#[must_use]
pub fn clear_filter(bank: MemoryBank) -> EpcFilterSpec {
    EpcFilterSpec {
        bank,
        start_bit: start_bit_for(bank),
        bit_length: 0,
        value_hex: String::new(),
    }
}

/// Derive the EPC-bank filter for a numeric company identifier.
///
/// The company ID is left-padded with zeros to a fixed bit width, prefixed
/// with the constant header bit pattern, and the resulting bit string is
/// packed to hex. When the bit count is not a whole number of nibbles the
/// value is right-padded with a trailing zero nibble; the reported
/// `bit_length` excludes the pad so only the real bits participate in the
/// match.
///
/// # Examples
///
/// ```
/// use tagrelay_reader::company_filter;
///
/// let spec = company_filter(0x00ABCD);
/// assert_eq!(spec.start_bit, 32);
/// assert_eq!(spec.value_hex, "3000ABCD");
/// assert_eq!(spec.bit_length, 32);
/// ```
#[must_use]
pub fn company_filter(company_id: u64) -> EpcFilterSpec {
    let mut bits = String::with_capacity(COMPANY_HEADER_BITS.len() + COMPANY_ID_BIT_WIDTH);
    bits.push_str(COMPANY_HEADER_BITS);
    for shift in (0..COMPANY_ID_BIT_WIDTH).rev() {
        bits.push(if (company_id >> shift) & 1 == 1 { '1' } else { '0' });
    }

    let bit_length = bits.len() as u32;
    EpcFilterSpec {
        bank: MemoryBank::Epc,
        start_bit: EPC_FILTER_START_BIT,
        bit_length,
        value_hex: bits_to_hex(&bits),
    }
}

/// Pack a bit string ("0"/"1" characters) into uppercase hex, right-padding
/// with zero bits to a whole number of nibbles, then to a whole byte.
#[must_use]
pub fn bits_to_hex(bits: &str) -> String {
    let mut padded = bits.to_string();
    while padded.len() % 8 != 0 {
        padded.push('0');
    }

    let mut hex = String::with_capacity(padded.len() / 4);
    for nibble in padded.as_bytes().chunks(4) {
        let mut value = 0u8;
        for &b in nibble {
            value = (value << 1) | (b - b'0');
        }
        hex.push(char::from_digit(u32::from(value), 16).unwrap_or('0').to_ascii_uppercase());
    }
    hex
}

/// Unpack hex into a bit string; inverse of [`bits_to_hex`] modulo the pad.
#[must_use]
pub fn hex_to_bits(hex: &str) -> String {
    let mut bits = String::with_capacity(hex.len() * 4);
    for c in hex.chars() {
        let value = c.to_digit(16).unwrap_or(0);
        for shift in (0..4).rev() {
            bits.push(if (value >> shift) & 1 == 1 { '1' } else { '0' });
        }
    }
    bits
}

fn start_bit_for(bank: MemoryBank) -> u32 {
    match bank {
        MemoryBank::Epc => EPC_FILTER_START_BIT,
        MemoryBank::Tid => TID_FILTER_START_BIT,
    }
}
