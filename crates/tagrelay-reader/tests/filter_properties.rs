//! Property-based tests for the EPC/TID filter encoding.
//!
//! These tests use proptest to verify the encoding invariants for all valid
//! inputs: whole-byte hex output, bit-exact company ID round-trips, and
//! zero-only padding.

use proptest::prelude::*;
use tagrelay_core::MemoryBank;
use tagrelay_core::constants::{COMPANY_HEADER_BITS, COMPANY_ID_BIT_WIDTH};
use tagrelay_reader::filter::{bits_to_hex, hex_to_bits};
use tagrelay_reader::{company_filter, filter_for_value};

/// Strategy for company IDs that fit the padded bit width.
fn valid_company_id() -> impl Strategy<Value = u64> {
    0u64..(1u64 << COMPANY_ID_BIT_WIDTH)
}

/// Strategy for partial-identifier hex strings, odd and even lengths.
fn valid_partial_hex() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-fA-F]{1,24}").expect("valid hex regex")
}

proptest! {
    /// The derived company filter, when bit-unpacked, reproduces the header
    /// prefix and the zero-padded company ID, modulo the trailing pad.
    #[test]
    fn prop_company_filter_round_trips(company_id in valid_company_id()) {
        let spec = company_filter(company_id);
        let bits = hex_to_bits(&spec.value_hex);

        prop_assert_eq!(&bits[..COMPANY_HEADER_BITS.len()], COMPANY_HEADER_BITS);

        let id_bits = &bits[COMPANY_HEADER_BITS.len()
            ..COMPANY_HEADER_BITS.len() + COMPANY_ID_BIT_WIDTH];
        prop_assert_eq!(u64::from_str_radix(id_bits, 2).unwrap(), company_id);

        // Whole bytes on the wire, zero-only pad past the match window.
        prop_assert_eq!(spec.value_hex.len() % 2, 0);
        for pad_bit in bits[spec.bit_length as usize..].chars() {
            prop_assert_eq!(pad_bit, '0');
        }
    }

    /// Every value filter reports the caller's bit length and pads the wire
    /// value to whole bytes.
    #[test]
    fn prop_value_filter_is_whole_bytes(hex in valid_partial_hex()) {
        for bank in [MemoryBank::Epc, MemoryBank::Tid] {
            let spec = filter_for_value(bank, &hex).unwrap();
            prop_assert_eq!(spec.bit_length as usize, 4 * hex.len());
            prop_assert_eq!(spec.value_hex.len() % 2, 0);
            prop_assert!(
                spec.value_hex
                    .starts_with(&hex.to_ascii_uppercase())
            );
        }
    }

    /// Bit packing and unpacking are inverses modulo byte padding.
    #[test]
    fn prop_bits_hex_round_trip(bits in prop::string::string_regex("[01]{1,64}").unwrap()) {
        let hex = bits_to_hex(&bits);
        let unpacked = hex_to_bits(&hex);
        prop_assert_eq!(&unpacked[..bits.len()], bits.as_str());
        for pad_bit in unpacked[bits.len()..].chars() {
            prop_assert_eq!(pad_bit, '0');
        }
    }
}
