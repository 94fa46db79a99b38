//! Test utilities: a lock-side protocol simulator and an in-process
//! transport wired to it.
//!
//! `SimulatedLock` speaks the real protocol with real crypto, which keeps
//! the companion-side machines honest: a handshake only completes if both
//! transcripts agree byte for byte.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use keylink_crypto::{
    compute_authenticator, generate_nonce, verify_authenticator, KeyPair, Nonce, SharedSecret,
    AUTHENTICATOR_LEN,
};

use crate::codec::{decode_plain, decode_secure, encode_plain, encode_secure, CommandFrame};
use crate::commands::{Command, CommandStatus, DeviceError};
use crate::errors::TransportError;
use crate::transport::{ConnectionState, Transport, TransportEvent};
use crate::types::AuthorizationId;

const DEFAULT_PIN: u16 = 0x3039;

/// Scripted quirks for exercising unhappy paths.
#[derive(Debug, Clone, Default)]
pub struct LockBehavior {
    /// Swallow every command without replying.
    pub silent: bool,
    /// Answer the next N commands with a busy error.
    pub busy_replies: u32,
    /// Skip the Accepted status and complete directly.
    pub skip_accepted: bool,
    /// Send list entries first and the count frame last.
    pub count_last: bool,
    /// Refuse the authorization-data step of pairing with an error report.
    pub reject_authorization: bool,
}

/// A lock-side implementation of the protocol for tests.
pub struct SimulatedLock {
    key_pair: KeyPair,
    auth_id: AuthorizationId,
    uuid: [u8; 16],
    pin: u16,
    behavior: LockBehavior,
    keypad_codes: Vec<Vec<u8>>,

    companion_public: Mutex<Option<[u8; 32]>>,
    shared: Mutex<Option<SharedSecret>>,
    issued_challenge: Mutex<Option<Nonce>>,
    paired: Mutex<bool>,

    busy_remaining: AtomicU32,
    frames_received: AtomicUsize,
    challenges_served: AtomicUsize,
}

impl SimulatedLock {
    pub fn new() -> Self {
        Self::with_behavior(LockBehavior::default())
    }

    pub fn with_behavior(behavior: LockBehavior) -> Self {
        let busy = behavior.busy_replies;
        Self {
            key_pair: KeyPair::generate(),
            auth_id: [0x2A, 0x00, 0x00, 0x00],
            uuid: [0x6B; 16],
            pin: DEFAULT_PIN,
            behavior,
            keypad_codes: vec![
                vec![0x01, 0x00, 0x11, 0x11],
                vec![0x02, 0x00, 0x22, 0x22],
                vec![0x03, 0x00, 0x33, 0x33],
            ],
            companion_public: Mutex::new(None),
            shared: Mutex::new(None),
            issued_challenge: Mutex::new(None),
            paired: Mutex::new(false),
            busy_remaining: AtomicU32::new(busy),
            frames_received: AtomicUsize::new(0),
            challenges_served: AtomicUsize::new(0),
        }
    }

    /// Pre-establish trust without running a handshake.
    pub fn with_trust(secret: SharedSecret) -> Self {
        let lock = Self::new();
        lock.install_trust(secret);
        lock
    }

    /// Install a shared secret directly, as if pairing had completed.
    pub fn install_trust(&self, secret: SharedSecret) {
        *self.shared.lock().unwrap() = Some(secret);
        *self.paired.lock().unwrap() = true;
    }

    pub fn authorization_id(&self) -> AuthorizationId {
        self.auth_id
    }

    pub fn shared_secret(&self) -> Option<SharedSecret> {
        self.shared.lock().unwrap().clone()
    }

    pub fn is_paired(&self) -> bool {
        *self.paired.lock().unwrap()
    }

    pub fn security_pin(&self) -> u16 {
        self.pin
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::SeqCst)
    }

    pub fn challenges_served(&self) -> usize {
        self.challenges_served.load(Ordering::SeqCst)
    }

    /// Process one inbound frame and produce the lock's replies.
    pub fn handle_frame(&self, raw: &[u8]) -> Vec<Bytes> {
        self.frames_received.fetch_add(1, Ordering::SeqCst);
        if let Ok(frame) = decode_plain(raw) {
            return self.handle_plain(frame);
        }
        let secret = self.shared.lock().unwrap().clone();
        if let Some(secret) = secret {
            if let Ok(frame) = decode_secure(raw, &secret) {
                return self.handle_secure(frame, raw, &secret);
            }
        }
        Vec::new()
    }

    fn issue_challenge(&self) -> Nonce {
        let nonce = generate_nonce();
        *self.issued_challenge.lock().unwrap() = Some(nonce);
        nonce
    }

    fn plain(&self, command: Command, payload: Vec<u8>) -> Bytes {
        encode_plain(&CommandFrame::new(command, payload))
    }

    fn secure(&self, secret: &SharedSecret, command: Command, payload: Vec<u8>) -> Bytes {
        encode_secure(
            &CommandFrame::new(command, payload),
            secret,
            &generate_nonce(),
            self.auth_id,
        )
    }

    fn plain_error(&self, code: DeviceError, command: Command) -> Vec<Bytes> {
        let mut payload = vec![code.code()];
        payload.extend_from_slice(&command.code().to_le_bytes());
        vec![self.plain(Command::ErrorReport, payload)]
    }

    fn secure_error(
        &self,
        secret: &SharedSecret,
        code: DeviceError,
        command: Command,
    ) -> Vec<Bytes> {
        let mut payload = vec![code.code()];
        payload.extend_from_slice(&command.code().to_le_bytes());
        vec![self.secure(secret, Command::ErrorReport, payload)]
    }

    fn handle_plain(&self, frame: CommandFrame) -> Vec<Bytes> {
        match frame.command {
            Command::RequestData
                if frame.payload == Command::PublicKey.code().to_le_bytes() =>
            {
                vec![self.plain(Command::PublicKey, self.key_pair.public_bytes().to_vec())]
            }
            Command::PublicKey => {
                let Ok(public) = <[u8; 32]>::try_from(frame.payload.as_slice()) else {
                    return self.plain_error(DeviceError::BadLength, frame.command);
                };
                *self.companion_public.lock().unwrap() = Some(public);
                *self.shared.lock().unwrap() = Some(self.key_pair.derive_shared(&public));
                let challenge = self.issue_challenge();
                vec![self.plain(Command::Challenge, challenge.to_vec())]
            }
            Command::AuthorizationAuthenticator => {
                let (secret, companion) = {
                    (
                        self.shared.lock().unwrap().clone(),
                        *self.companion_public.lock().unwrap(),
                    )
                };
                let (Some(secret), Some(companion)) = (secret, companion) else {
                    return self.plain_error(DeviceError::NotPairing, frame.command);
                };
                let challenge = self.issued_challenge.lock().unwrap().unwrap_or_default();
                let valid = verify_authenticator(
                    &secret,
                    &[&companion, &self.key_pair.public_bytes(), &challenge],
                    &frame.payload,
                );
                if !valid {
                    return self.plain_error(DeviceError::BadAuthenticator, frame.command);
                }
                let challenge = self.issue_challenge();
                vec![self.plain(Command::Challenge, challenge.to_vec())]
            }
            Command::AuthorizationData => {
                if self.behavior.reject_authorization {
                    return self.plain_error(DeviceError::MaxUser, frame.command);
                }
                let Some(secret) = self.shared.lock().unwrap().clone() else {
                    return self.plain_error(DeviceError::NotPairing, frame.command);
                };
                if frame.payload.len() != AUTHENTICATOR_LEN + 1 + 4 + 32 + 32 {
                    return self.plain_error(DeviceError::BadLength, frame.command);
                }
                let (tag, fields) = frame.payload.split_at(AUTHENTICATOR_LEN);
                let challenge = self.issued_challenge.lock().unwrap().unwrap_or_default();
                if !verify_authenticator(&secret, &[fields, &challenge], tag) {
                    return self.plain_error(DeviceError::BadAuthenticator, frame.command);
                }
                let closing = self.issue_challenge();
                let mut grant = self.auth_id.to_vec();
                grant.extend_from_slice(&self.uuid);
                grant.extend_from_slice(&closing);
                let tag = compute_authenticator(&secret, &[&grant]);
                let mut payload = tag.to_vec();
                payload.extend_from_slice(&grant);
                vec![self.plain(Command::AuthorizationId, payload)]
            }
            Command::AuthorizationIdConfirmation => {
                let Some(secret) = self.shared.lock().unwrap().clone() else {
                    return self.plain_error(DeviceError::NotPairing, frame.command);
                };
                if frame.payload.len() != AUTHENTICATOR_LEN + 4 {
                    return self.plain_error(DeviceError::BadLength, frame.command);
                }
                let (tag, echoed_id) = frame.payload.split_at(AUTHENTICATOR_LEN);
                let closing = self.issued_challenge.lock().unwrap().unwrap_or_default();
                let valid = echoed_id == self.auth_id.as_slice()
                    && verify_authenticator(&secret, &[echoed_id, &closing], tag);
                if !valid {
                    return self.plain_error(DeviceError::BadAuthenticator, frame.command);
                }
                *self.paired.lock().unwrap() = true;
                vec![self.plain(Command::Status, vec![CommandStatus::Complete as u8])]
            }
            _ => self.plain_error(DeviceError::NotPairing, frame.command),
        }
    }

    fn handle_secure(
        &self,
        frame: CommandFrame,
        raw: &[u8],
        secret: &SharedSecret,
    ) -> Vec<Bytes> {
        if self.behavior.silent {
            return Vec::new();
        }

        if frame.command == Command::RequestData {
            if frame.payload == Command::Challenge.code().to_le_bytes() {
                self.challenges_served.fetch_add(1, Ordering::SeqCst);
                let challenge = self.issue_challenge();
                return vec![self.secure(secret, Command::Challenge, challenge.to_vec())];
            }
            // Direct data reads answer with a canned frame of the
            // requested type.
            if frame.payload.len() == 2 {
                let code = u16::from_le_bytes([frame.payload[0], frame.payload[1]]);
                if let Some(requested) = Command::from_code(code) {
                    return vec![self.secure(secret, requested, vec![0x00; 19])];
                }
            }
            return self.secure_error(secret, DeviceError::BadParameter, frame.command);
        }

        // Everything past this point is an actual command; busy scripting
        // applies here, not to challenge fetches.
        if self
            .busy_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return self.secure_error(secret, DeviceError::Busy, frame.command);
        }

        // Challenge-bound commands must reuse the issued nonce as the
        // envelope nonce.
        let issued = self.issued_challenge.lock().unwrap().take();
        let nonce_ok = issued.map_or(false, |nonce| raw[..32] == nonce);

        match frame.command {
            Command::LockAction => {
                if !nonce_ok {
                    return self.secure_error(secret, DeviceError::BadNonce, frame.command);
                }
                let mut replies = Vec::new();
                if !self.behavior.skip_accepted {
                    replies.push(self.secure(
                        secret,
                        Command::Status,
                        vec![CommandStatus::Accepted as u8],
                    ));
                }
                replies.push(self.secure(
                    secret,
                    Command::Status,
                    vec![CommandStatus::Complete as u8],
                ));
                replies
            }
            Command::RequestConfig => {
                if !nonce_ok {
                    return self.secure_error(secret, DeviceError::BadNonce, frame.command);
                }
                vec![self.secure(secret, Command::Config, vec![0x5A; 24])]
            }
            Command::VerifySecurityPin => {
                if !self.pin_ok(&frame.payload) {
                    return self.secure_error(secret, DeviceError::BadPin, frame.command);
                }
                vec![self.secure(secret, Command::Status, vec![CommandStatus::Complete as u8])]
            }
            Command::RequestKeypadCodes => {
                if !self.pin_ok(&frame.payload) {
                    return self.secure_error(secret, DeviceError::BadPin, frame.command);
                }
                let count = self.secure(
                    secret,
                    Command::KeypadCodeCount,
                    (self.keypad_codes.len() as u16).to_le_bytes().to_vec(),
                );
                let mut replies: Vec<Bytes> = self
                    .keypad_codes
                    .iter()
                    .map(|code| self.secure(secret, Command::KeypadCode, code.clone()))
                    .collect();
                if self.behavior.count_last {
                    replies.push(count);
                } else {
                    replies.insert(0, count);
                }
                replies
            }
            _ => self.secure_error(secret, DeviceError::BadParameter, frame.command),
        }
    }

    /// PIN commands carry the echoed challenge and then the PIN as the
    /// trailing u16.
    fn pin_ok(&self, payload: &[u8]) -> bool {
        if payload.len() < 32 + 2 {
            return false;
        }
        let tail = &payload[payload.len() - 2..];
        u16::from_le_bytes([tail[0], tail[1]]) == self.pin
    }
}

impl Default for SimulatedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-process transport that feeds frames straight into a
/// `SimulatedLock` and queues its replies as events.
pub struct MockTransport {
    lock: Arc<SimulatedLock>,
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl MockTransport {
    /// A transport that reports Connected immediately.
    pub fn connected(lock: Arc<SimulatedLock>) -> Self {
        let transport = Self::disconnected(lock);
        let _ = transport
            .tx
            .send(TransportEvent::Connection(ConnectionState::Connected));
        transport
    }

    /// A transport with no link yet; push events via `event_sender`.
    pub fn disconnected(lock: Arc<SimulatedLock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            lock,
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Handle for injecting out-of-band events (disconnects, stray frames).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.tx.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        for reply in self.lock.handle_frame(&frame) {
            let _ = self.tx.send(TransportEvent::Frame(reply));
        }
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.rx.lock().await.recv().await
    }
}
