//! CRC-16/CCITT-FALSE as used by the lock's wire framing.
//!
//! Polynomial 0x1021, initial value 0xFFFF, no input/output reflection,
//! no final XOR. The checksum is appended little-endian to every
//! plaintext command body.

use constant_time_eq::constant_time_eq;

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Compute the CRC-16/CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = INIT;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Append the checksum of `buf` to `buf`, little-endian.
pub fn append_crc(buf: &mut Vec<u8>) {
    let crc = crc16(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Split `data` into (body, crc) and verify the trailing checksum.
///
/// The comparison is constant-time. Returns the body on success.
pub fn split_verified(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 2 {
        return None;
    }
    let (body, tail) = data.split_at(data.len() - 2);
    let expected = crc16(body).to_le_bytes();
    if constant_time_eq(&expected, tail) {
        Some(body)
    } else {
        None
    }
}
