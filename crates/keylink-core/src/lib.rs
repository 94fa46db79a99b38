//! Keylink Core - companion-side logic for a BLE smart lock.
//!
//! This crate implements:
//! - The plain and secure wire codec (CRC-16 framing, AES-CBC envelopes)
//! - The pairing handshake state machine
//! - The authenticated command state machine with challenge round-trips
//! - Order-independent accumulation of multi-frame list responses
//! - Transport and trust-store abstractions
//! - The session engine tying it all together

#![forbid(unsafe_code)]

// Core state machines
pub mod command;
pub mod pairing;

// Wire format
pub mod codec;
pub mod commands;

// Services
pub mod actions;
pub mod engine;
pub mod list;

// Infrastructure
pub mod store;
pub mod transport;

// Supporting modules
pub mod errors;
pub mod harness;
pub mod types;
