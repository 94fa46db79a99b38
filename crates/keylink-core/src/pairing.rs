//! The pairing handshake state machine (companion side).
//!
//! Pairing runs over plain frames and establishes the trust anchor: an
//! X25519 exchange, two challenge/authenticator round-trips proving both
//! sides hold the derived secret, the lock's authorization-id grant, and
//! a final confirmation plus status.
//!
//! The machine is sans-IO: `start` and `handle_frame` return frames to
//! send or a terminal outcome, and the engine owns timing and transport.
//! Frames that fail to decode are ignored; the handshake deadline turns
//! persistent garbage into a timeout. A well-formed frame the current
//! step cannot accept fails the attempt.

use bytes::Bytes;
use tracing::{debug, warn};

use keylink_crypto::{
    compute_authenticator, generate_nonce, verify_authenticator, KeyPair, Nonce, SharedSecret,
    AUTHENTICATOR_LEN,
};

use crate::codec::{decode_plain, encode_plain, CommandFrame};
use crate::commands::{Command, CommandStatus, DeviceError};
use crate::errors::PairingError;
use crate::types::{AppIdentity, AuthorizationId, TrustAnchor};

const PUBLIC_KEY_LEN: usize = 32;
const UUID_LEN: usize = 16;
const NONCE_LEN: usize = keylink_crypto::NONCE_LEN;

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Created, nothing sent yet.
    InitPairing,
    /// Asked the lock for its public key.
    ReqRemPubKey,
    /// Lock public key received.
    RecRemPubKey,
    /// Our keypair generated.
    GenKeyPair,
    /// Our public key sent, awaiting the first challenge.
    SendPubKey,
    /// Shared secret derived, authenticator computed.
    CalculateAuth,
    /// Authenticator sent, awaiting the second challenge.
    SendAuth,
    /// Authorization data sent, awaiting the id grant.
    SendAuthData,
    /// Id confirmation sent.
    SendAuthIdConf,
    /// Awaiting the closing status.
    RecStatus,
    /// Trust anchor established.
    Success,
    /// Deadline passed without completing.
    Timeout,
}

/// What the engine should do next.
#[derive(Debug)]
pub enum PairingStep {
    /// Transmit this frame, then keep waiting.
    Send(Bytes),
    /// Keep waiting.
    Pending,
    /// Handshake done; persist and use this anchor.
    Complete(TrustAnchor),
}

/// One pairing attempt.
pub struct PairingSession {
    state: PairingState,
    identity: AppIdentity,
    key_pair: Option<KeyPair>,
    remote_public: Option<[u8; PUBLIC_KEY_LEN]>,
    shared: Option<SharedSecret>,
    local_nonce: Option<Nonce>,
    auth_id: Option<AuthorizationId>,
}

impl PairingSession {
    pub fn new(identity: AppIdentity) -> Self {
        Self {
            state: PairingState::InitPairing,
            identity,
            key_pair: None,
            remote_public: None,
            shared: None,
            local_nonce: None,
            auth_id: None,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Engine deadline fired; park the machine.
    pub fn expire(&mut self) {
        self.advance(PairingState::Timeout);
    }

    fn advance(&mut self, next: PairingState) {
        debug!(from = ?self.state, to = ?next, "pairing transition");
        self.state = next;
    }

    /// Kick off the handshake: ask the lock for its public key.
    pub fn start(&mut self) -> PairingStep {
        self.advance(PairingState::ReqRemPubKey);
        let request = CommandFrame::new(
            Command::RequestData,
            Command::PublicKey.code().to_le_bytes().to_vec(),
        );
        PairingStep::Send(encode_plain(&request))
    }

    /// Feed one raw inbound frame through the machine.
    pub fn handle_frame(&mut self, raw: &[u8]) -> Result<PairingStep, PairingError> {
        let frame = match decode_plain(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, len = raw.len(), "dropping undecodable pairing frame");
                return Ok(PairingStep::Pending);
            }
        };

        if frame.command == Command::ErrorReport {
            let code = frame
                .payload
                .first()
                .and_then(|&b| DeviceError::from_byte(b))
                .unwrap_or(DeviceError::Unknown);
            return Err(PairingError::Device(code));
        }

        match (self.state, frame.command) {
            (PairingState::ReqRemPubKey, Command::PublicKey) => self.on_remote_public(frame),
            (PairingState::SendPubKey, Command::Challenge) => self.on_first_challenge(frame),
            (PairingState::SendAuth, Command::Challenge) => self.on_second_challenge(frame),
            (PairingState::SendAuthData, Command::AuthorizationId) => self.on_auth_id(frame),
            (PairingState::RecStatus, Command::Status) => self.on_status(frame),
            (_, command) => Err(PairingError::UnexpectedCommand(command)),
        }
    }

    fn on_remote_public(&mut self, frame: CommandFrame) -> Result<PairingStep, PairingError> {
        let remote = fixed::<PUBLIC_KEY_LEN>(&frame)?;
        self.advance(PairingState::RecRemPubKey);
        self.remote_public = Some(remote);

        self.advance(PairingState::GenKeyPair);
        let key_pair = KeyPair::generate();
        let our_public = key_pair.public_bytes();
        self.key_pair = Some(key_pair);

        self.advance(PairingState::SendPubKey);
        let reply = CommandFrame::new(Command::PublicKey, our_public.to_vec());
        Ok(PairingStep::Send(encode_plain(&reply)))
    }

    fn on_first_challenge(&mut self, frame: CommandFrame) -> Result<PairingStep, PairingError> {
        let challenge = fixed::<NONCE_LEN>(&frame)?;
        let remote = self.remote_public.ok_or_else(unreachable_state)?;

        self.advance(PairingState::CalculateAuth);
        let key_pair = self.key_pair.as_ref().ok_or_else(unreachable_state)?;
        let shared = key_pair.derive_shared(&remote);
        let authenticator = compute_authenticator(
            &shared,
            &[&key_pair.public_bytes(), &remote, &challenge],
        );
        self.shared = Some(shared);
        self.local_nonce = Some(generate_nonce());

        self.advance(PairingState::SendAuth);
        let reply = CommandFrame::new(Command::AuthorizationAuthenticator, authenticator.to_vec());
        Ok(PairingStep::Send(encode_plain(&reply)))
    }

    fn on_second_challenge(&mut self, frame: CommandFrame) -> Result<PairingStep, PairingError> {
        let challenge = fixed::<NONCE_LEN>(&frame)?;
        let shared = self.shared.as_ref().ok_or_else(unreachable_state)?;
        let local_nonce = self.local_nonce.ok_or_else(unreachable_state)?;

        // Fields we commit to: identity class, app id, name, our nonce.
        let mut fields = Vec::with_capacity(1 + 4 + 32 + NONCE_LEN);
        fields.push(self.identity.id_type);
        fields.extend_from_slice(&self.identity.app_id.to_le_bytes());
        fields.extend_from_slice(&self.identity.name_bytes());
        fields.extend_from_slice(&local_nonce);

        let authenticator = compute_authenticator(shared, &[&fields, &challenge]);

        let mut payload = authenticator.to_vec();
        payload.extend_from_slice(&fields);

        self.advance(PairingState::SendAuthData);
        let reply = CommandFrame::new(Command::AuthorizationData, payload);
        Ok(PairingStep::Send(encode_plain(&reply)))
    }

    fn on_auth_id(&mut self, frame: CommandFrame) -> Result<PairingStep, PairingError> {
        const EXPECTED: usize = AUTHENTICATOR_LEN + 4 + UUID_LEN + NONCE_LEN;
        if frame.payload.len() != EXPECTED {
            return Err(PairingError::BadPayloadLength {
                command: frame.command,
                expected: EXPECTED,
                got: frame.payload.len(),
            });
        }
        let shared = self.shared.as_ref().ok_or_else(unreachable_state)?;

        let (tag, granted) = frame.payload.split_at(AUTHENTICATOR_LEN);
        if !verify_authenticator(shared, &[granted], tag) {
            return Err(PairingError::BadAuthenticator);
        }

        let auth_id: AuthorizationId = granted[..4].try_into().expect("length checked");
        let closing_nonce = &granted[4 + UUID_LEN..];
        self.auth_id = Some(auth_id);

        let confirmation = compute_authenticator(shared, &[&auth_id, closing_nonce]);
        let mut payload = confirmation.to_vec();
        payload.extend_from_slice(&auth_id);

        self.advance(PairingState::SendAuthIdConf);
        let reply = CommandFrame::new(Command::AuthorizationIdConfirmation, payload);
        self.advance(PairingState::RecStatus);
        Ok(PairingStep::Send(encode_plain(&reply)))
    }

    fn on_status(&mut self, frame: CommandFrame) -> Result<PairingStep, PairingError> {
        let status = frame
            .payload
            .first()
            .and_then(|&b| CommandStatus::from_byte(b));
        if status != Some(CommandStatus::Complete) {
            return Err(PairingError::UnexpectedCommand(Command::Status));
        }
        let shared = self.shared.take().ok_or_else(unreachable_state)?;
        let auth_id = self.auth_id.ok_or_else(unreachable_state)?;

        self.advance(PairingState::Success);
        debug!(auth_id = %hex::encode(auth_id), "pairing complete");
        Ok(PairingStep::Complete(TrustAnchor {
            shared_secret: shared,
            authorization_id: auth_id,
        }))
    }
}

fn fixed<const N: usize>(frame: &CommandFrame) -> Result<[u8; N], PairingError> {
    frame
        .payload
        .as_slice()
        .try_into()
        .map_err(|_| PairingError::BadPayloadLength {
            command: frame.command,
            expected: N,
            got: frame.payload.len(),
        })
}

// Guarded fields are always set before the states that read them.
fn unreachable_state() -> PairingError {
    PairingError::UnexpectedCommand(Command::Empty)
}
