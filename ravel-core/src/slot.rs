//! Key to slot hashing.
//!
//! A key maps to `CRC16(key) mod 16384`, where CRC16 is the XMODEM
//! variant. If the key carries a hash tag (the bytes between the first
//! `{` and the next `}`, when non-empty) only the tag is hashed, so
//! related keys can be forced onto one slot.

use crc::{Crc, CRC_16_XMODEM};

use crate::limits::SLOT_COUNT;
use crate::types::Slot;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Returns the part of the key that is hashed.
#[must_use]
pub fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    let body = &key[open + 1..];
    match body.iter().position(|&b| b == b'}') {
        Some(len) if len > 0 => &body[..len],
        _ => key,
    }
}

/// Computes the hash slot owning the given key.
#[must_use]
pub fn key_slot(key: &[u8]) -> Slot {
    Slot::new(CRC16.checksum(hash_tag(key)) % SLOT_COUNT)
}
