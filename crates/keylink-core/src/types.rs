//! Shared data types: actions, results, trust records, engine configuration.

use std::time::Duration;

use keylink_crypto::SharedSecret;

use crate::codec::CommandFrame;
use crate::commands::Command;

/// Authorization id assigned by the lock at pairing, echoed in every
/// secure envelope we send.
pub type AuthorizationId = [u8; 4];

/// The credentials that make a lock "paired": the derived shared secret
/// and the authorization id it assigned us.
#[derive(Clone)]
pub struct TrustAnchor {
    pub shared_secret: SharedSecret,
    pub authorization_id: AuthorizationId,
}

impl std::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("authorization_id", &hex::encode(self.authorization_id))
            .finish_non_exhaustive()
    }
}

/// Who we claim to be during pairing.
#[derive(Debug, Clone)]
pub struct AppIdentity {
    /// Identity class byte (0 = app, 1 = bridge, 2 = fob).
    pub id_type: u8,
    /// Application id, u32 little-endian on the wire.
    pub app_id: u32,
    /// Display name, padded/truncated to 32 bytes on the wire.
    pub name: String,
}

impl AppIdentity {
    pub fn app(app_id: u32, name: impl Into<String>) -> Self {
        Self {
            id_type: 0,
            app_id,
            name: name.into(),
        }
    }

    /// Name field as it appears on the wire.
    pub fn name_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let src = self.name.as_bytes();
        let n = src.len().min(32);
        out[..n].copy_from_slice(&src[..n]);
        out
    }
}

/// How a command interacts with the challenge mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Sent directly, no challenge round-trip.
    Command,
    /// Requires a fresh challenge nonce from the lock first.
    CommandWithChallenge,
    /// Requires a challenge and completes via Accepted then Complete.
    CommandWithChallengeAndAccept,
    /// Requires a challenge and carries the security PIN.
    CommandWithChallengeAndPin,
}

/// One command to execute against the lock.
#[derive(Debug, Clone)]
pub struct Action {
    pub command: Command,
    pub command_type: CommandType,
    pub payload: Vec<u8>,
}

/// Terminal classification of a command attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdResult {
    /// The lock confirmed completion.
    Success,
    /// The lock rejected the command.
    Failed,
    /// No usable reply before the deadline, or the link dropped.
    TimeOut,
    /// Another session already holds the engine; nothing was sent.
    Working,
    /// No trust record exists; nothing was sent.
    NotPaired,
    /// The lock stayed busy through every retry.
    LockBusy,
    /// A local failure before or during the exchange.
    Error,
}

/// Outcome of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingResult {
    Success,
    Timeout,
    Failed,
}

/// Result of a command plus whatever data frames the lock returned.
#[derive(Debug, Clone)]
pub struct CmdResponse {
    pub result: CmdResult,
    pub frames: Vec<CommandFrame>,
}

impl CmdResponse {
    pub fn bare(result: CmdResult) -> Self {
        Self {
            result,
            frames: Vec::new(),
        }
    }
}

/// Engine timing and retry knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Absolute bound on one pairing handshake.
    pub pairing_timeout: Duration,
    /// Absolute bound on one command exchange. Enumerations slide it on
    /// each list frame instead, capped by `list_max_duration`.
    pub command_timeout: Duration,
    /// Absolute bound on a multi-frame list enumeration.
    pub list_max_duration: Duration,
    /// How many times a busy reply is retried before giving up.
    pub busy_retry_cap: u32,
    /// Base backoff step; attempt n waits n * step.
    pub busy_backoff_step: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(5),
            list_max_duration: Duration::from_secs(60),
            busy_retry_cap: 3,
            busy_backoff_step: Duration::from_millis(200),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_bytes_pads_short_names() {
        let id = AppIdentity::app(7, "phone");
        let bytes = id.name_bytes();
        assert_eq!(&bytes[..5], b"phone");
        assert!(bytes[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_name_bytes_truncates_long_names() {
        let id = AppIdentity::app(7, "x".repeat(40));
        assert_eq!(id.name_bytes(), [b'x'; 32]);
    }

    #[test]
    fn test_trust_anchor_debug_hides_secret() {
        let anchor = TrustAnchor {
            shared_secret: SharedSecret::from_bytes([0xAB; 32]),
            authorization_id: [1, 2, 3, 4],
        };
        let printed = format!("{:?}", anchor);
        assert!(printed.contains("01020304"));
        assert!(!printed.contains("ab".repeat(8).as_str()));
    }
}
