//! Error types for Keylink Core.
//!
//! Frame-level problems (ProtocolError) are recoverable: a garbled frame is
//! dropped and the session keeps waiting for its deadline. Pairing errors
//! fail the handshake attempt. Lock-reported command failures are not Rust
//! errors at all; they surface as `CmdResult` variants because callers
//! branch on the classification.

use thiserror::Error;

use crate::commands::{Command, DeviceError};

/// Frame decode failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame shorter than the minimum for its framing.
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    /// Trailing CRC-16 did not match the body.
    #[error("crc mismatch")]
    CrcMismatch,

    /// Secure envelope could not be decrypted.
    #[error("envelope decryption failed")]
    Decrypt,

    /// Command code not in the protocol table.
    #[error("unknown command code {0:#06x}")]
    UnknownCommand(u16),
}

/// Failures that abort a pairing attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// The lock reported an error during the handshake.
    #[error("lock reported {0:?} during pairing")]
    Device(DeviceError),

    /// A well-formed frame arrived that the current step cannot accept.
    #[error("unexpected {0:?} frame during pairing")]
    UnexpectedCommand(Command),

    /// A handshake field had the wrong size.
    #[error("bad {command:?} payload: expected {expected} bytes, got {got}")]
    BadPayloadLength {
        command: Command,
        expected: usize,
        got: usize,
    },

    /// The lock's authenticator did not verify.
    #[error("authenticator verification failed")]
    BadAuthenticator,

    /// Transport failed mid-handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Persisting the trust record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transport adapter failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("event stream closed")]
    Closed,
}

/// Trust store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    OperationFailed(String),
}
