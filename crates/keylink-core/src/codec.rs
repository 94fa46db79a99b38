//! Plain and secure frame codec.
//!
//! Plain frames (pairing only): `command(u16 LE) || payload || crc16(LE)`.
//! Secure frames (everything after pairing): the same plaintext layout
//! sealed into an AES-256-CBC envelope carrying a 32-byte nonce and our
//! authorization id. The CRC rides inside the ciphertext, so tampering is
//! caught after decryption.

use bytes::Bytes;

use keylink_crypto::envelope::{open_envelope, seal_envelope};
use keylink_crypto::{crc, Nonce, SharedSecret};

use crate::commands::Command;
use crate::errors::ProtocolError;
use crate::types::AuthorizationId;

/// Minimum plain frame: command code plus CRC.
pub const MIN_PLAIN_LEN: usize = 4;

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl CommandFrame {
    pub fn new(command: Command, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }
}

fn encode_body(frame: &CommandFrame) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + frame.payload.len() + 2);
    body.extend_from_slice(&frame.command.code().to_le_bytes());
    body.extend_from_slice(&frame.payload);
    crc::append_crc(&mut body);
    body
}

fn decode_body(body: &[u8]) -> Result<CommandFrame, ProtocolError> {
    if body.len() < MIN_PLAIN_LEN {
        return Err(ProtocolError::TooShort(body.len()));
    }
    let checked = crc::split_verified(body).ok_or(ProtocolError::CrcMismatch)?;
    let code = u16::from_le_bytes([checked[0], checked[1]]);
    let command = Command::from_code(code).ok_or(ProtocolError::UnknownCommand(code))?;
    Ok(CommandFrame::new(command, &checked[2..]))
}

/// Encode a plain (unencrypted) frame.
pub fn encode_plain(frame: &CommandFrame) -> Bytes {
    Bytes::from(encode_body(frame))
}

/// Decode and CRC-check a plain frame.
pub fn decode_plain(raw: &[u8]) -> Result<CommandFrame, ProtocolError> {
    decode_body(raw)
}

/// Encode a frame into a secure envelope.
pub fn encode_secure(
    frame: &CommandFrame,
    secret: &SharedSecret,
    nonce: &Nonce,
    auth_id: AuthorizationId,
) -> Bytes {
    let body = encode_body(frame);
    Bytes::from(seal_envelope(&body, secret, nonce, &auth_id))
}

/// Open a secure envelope and decode the frame inside it.
pub fn decode_secure(raw: &[u8], secret: &SharedSecret) -> Result<CommandFrame, ProtocolError> {
    let (_auth_id, body) = open_envelope(raw, secret).map_err(|_| ProtocolError::Decrypt)?;
    decode_body(&body)
}
