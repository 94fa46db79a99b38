//! Cryptographic primitives for the Keylink smart-lock protocol.
//!
//! This crate implements:
//! - CRC-16/CCITT-FALSE framing checksums
//! - X25519 key agreement with HKDF-SHA256 key derivation
//! - HMAC-SHA256 pairing authenticators
//! - The AES-256-CBC secure envelope used after pairing

#![forbid(unsafe_code)]

pub mod auth;
pub mod crc;
pub mod envelope;
pub mod keys;

#[cfg(test)]
mod proptests;

pub use auth::{compute_authenticator, verify_authenticator, AUTHENTICATOR_LEN};
pub use envelope::{open_envelope, seal_envelope, EnvelopeError, AUTH_ID_LEN, MIN_ENVELOPE_LEN};
pub use keys::{generate_nonce, KeyPair, SharedSecret, Nonce, NONCE_LEN, SHARED_SECRET_LEN};
