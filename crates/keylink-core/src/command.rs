//! The authenticated command state machine.
//!
//! Every command after pairing travels in a secure envelope. Most commands
//! first fetch a fresh challenge nonce from the lock and bind the actual
//! command to it by using the challenge as the envelope nonce. Terminal
//! replies are a Status frame, a data frame, or an ErrorReport; list
//! requests accumulate entry frames until the announced count arrives.
//!
//! Like pairing, the machine is sans-IO. The engine feeds it raw frames
//! and the clock; it answers with frames to send or a terminal result.

use std::mem;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, warn};

use keylink_crypto::generate_nonce;

use crate::codec::{decode_secure, encode_secure, CommandFrame};
use crate::commands::{Command, CommandStatus, DeviceError};
use crate::list::{ListAccumulator, ListKind};
use crate::types::{Action, CmdResult, CommandType, EngineConfig, TrustAnchor};

/// Where the command exchange currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// No exchange in progress.
    Idle,
    /// Action accepted, nothing sent yet.
    CmdReceived,
    /// Challenge request sent, awaiting the nonce.
    ChallengeSent,
    /// Challenge nonce received.
    ChallengeRespReceived,
    /// The command itself is on the wire.
    CmdSent,
    /// Lock acknowledged and is executing; Complete follows.
    CmdAccepted,
    /// Deadline passed or the link dropped.
    TimeOut,
}

/// What the engine should do next.
#[derive(Debug)]
pub enum CmdStep {
    /// Transmit this frame, then keep waiting.
    Send(Bytes),
    /// Keep waiting.
    Pending,
    /// Exchange finished with this classification.
    Done(CmdResult),
}

/// One command exchange against a paired lock.
pub struct CommandSession {
    state: CommandState,
    action: Action,
    trust: TrustAnchor,
    pin: Option<u16>,
    timeout: Duration,
    deadline: Instant,
    hard_deadline: Option<Instant>,
    list: Option<ListAccumulator>,
    frames: Vec<CommandFrame>,
}

impl CommandSession {
    pub fn new(
        action: Action,
        trust: TrustAnchor,
        pin: Option<u16>,
        config: &EngineConfig,
        now: Instant,
    ) -> Self {
        let list = ListKind::for_request(action.command).map(ListAccumulator::new);
        let hard_deadline = list.as_ref().map(|_| now + config.list_max_duration);
        Self {
            state: CommandState::CmdReceived,
            action,
            trust,
            pin,
            timeout: config.command_timeout,
            deadline: now + config.command_timeout,
            hard_deadline,
            list,
            frames: Vec::new(),
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// The instant at which `check_deadline` would time out.
    pub fn deadline(&self) -> Instant {
        match self.hard_deadline {
            Some(hard) => self.deadline.min(hard),
            None => self.deadline,
        }
    }

    /// Frames the lock returned, in arrival order. Consumes the buffer.
    pub fn take_frames(&mut self) -> Vec<CommandFrame> {
        mem::take(&mut self.frames)
    }

    fn advance(&mut self, next: CommandState) {
        debug!(from = ?self.state, to = ?next, command = ?self.action.command, "command transition");
        self.state = next;
    }

    /// Emit the opening frame: either the command itself or a challenge
    /// request, depending on the command type.
    pub fn start(&mut self) -> CmdStep {
        if self.action.command_type == CommandType::CommandWithChallengeAndPin
            && self.pin.is_none()
        {
            warn!(command = ?self.action.command, "no security pin stored; refusing to send");
            self.advance(CommandState::Idle);
            return CmdStep::Done(CmdResult::Error);
        }

        match self.action.command_type {
            CommandType::Command => {
                let frame = CommandFrame::new(self.action.command, self.action.payload.clone());
                let wire = self.seal(&frame, &generate_nonce());
                self.advance(CommandState::CmdSent);
                CmdStep::Send(wire)
            }
            _ => {
                let request = CommandFrame::new(
                    Command::RequestData,
                    Command::Challenge.code().to_le_bytes().to_vec(),
                );
                let wire = self.seal(&request, &generate_nonce());
                self.advance(CommandState::ChallengeSent);
                CmdStep::Send(wire)
            }
        }
    }

    /// Feed one raw inbound frame through the machine.
    pub fn handle_frame(&mut self, raw: &[u8], now: Instant) -> CmdStep {
        let frame = match decode_secure(raw, &self.trust.shared_secret) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, len = raw.len(), "dropping undecodable command frame");
                return CmdStep::Pending;
            }
        };

        // Only streaming list traffic extends the deadline; everything
        // else runs against the absolute bound set at session start.
        if let Some(kind) = self.list.as_ref().map(|l| l.kind()) {
            if frame.command == kind.entry || frame.command == kind.count {
                self.deadline = now + self.timeout;
            }
        }

        if frame.command == Command::ErrorReport {
            return self.on_error_report(&frame);
        }

        match self.state {
            CommandState::ChallengeSent => self.on_challenge(frame),
            CommandState::CmdSent | CommandState::CmdAccepted => self.on_reply(frame),
            _ => {
                debug!(command = ?frame.command, state = ?self.state, "ignoring frame");
                CmdStep::Pending
            }
        }
    }

    /// Engine deadline fired; park the machine.
    pub fn check_deadline(&mut self, now: Instant) -> Option<CmdResult> {
        if now >= self.deadline() {
            self.advance(CommandState::TimeOut);
            Some(CmdResult::TimeOut)
        } else {
            None
        }
    }

    /// The link dropped or the session was cancelled.
    pub fn abort(&mut self) -> CmdResult {
        self.advance(CommandState::TimeOut);
        CmdResult::TimeOut
    }

    fn seal(&self, frame: &CommandFrame, nonce: &keylink_crypto::Nonce) -> Bytes {
        encode_secure(
            frame,
            &self.trust.shared_secret,
            nonce,
            self.trust.authorization_id,
        )
    }

    fn on_error_report(&mut self, frame: &CommandFrame) -> CmdStep {
        let code = frame
            .payload
            .first()
            .and_then(|&b| DeviceError::from_byte(b))
            .unwrap_or(DeviceError::Unknown);
        warn!(error = ?code, command = ?self.action.command, "lock reported error");
        self.advance(CommandState::Idle);
        if code.is_busy() {
            CmdStep::Done(CmdResult::LockBusy)
        } else if code.is_trust_rejected() {
            CmdStep::Done(CmdResult::NotPaired)
        } else {
            CmdStep::Done(CmdResult::Failed)
        }
    }

    fn on_challenge(&mut self, frame: CommandFrame) -> CmdStep {
        let challenge: keylink_crypto::Nonce = match frame.payload.as_slice().try_into() {
            Ok(nonce) => nonce,
            Err(_) => {
                warn!(len = frame.payload.len(), "challenge nonce has wrong size");
                return CmdStep::Pending;
            }
        };
        self.advance(CommandState::ChallengeRespReceived);

        // The challenge rides inside the authenticated payload, followed
        // by the PIN for the PIN-carrying variant.
        let mut payload = self.action.payload.clone();
        payload.extend_from_slice(&challenge);
        if self.action.command_type == CommandType::CommandWithChallengeAndPin {
            // Presence was checked in start().
            let pin = self.pin.unwrap_or_default();
            payload.extend_from_slice(&pin.to_le_bytes());
        }

        // The challenge becomes the envelope nonce, binding the command
        // to this exchange.
        let frame = CommandFrame::new(self.action.command, payload);
        let wire = self.seal(&frame, &challenge);
        self.advance(CommandState::CmdSent);
        CmdStep::Send(wire)
    }

    fn on_reply(&mut self, frame: CommandFrame) -> CmdStep {
        if let Some(list) = self.list.as_mut() {
            let kind = list.kind();
            if frame.command == kind.entry {
                list.push_entry(frame);
                return self.finish_list_if_complete();
            }
            if frame.command == kind.count {
                if frame.payload.len() < 2 {
                    warn!("count frame too short");
                    return CmdStep::Pending;
                }
                let count = u16::from_le_bytes([frame.payload[0], frame.payload[1]]);
                list.set_expected(count as usize);
                return self.finish_list_if_complete();
            }
        }

        if frame.command == Command::Status {
            return match frame.payload.first().and_then(|&b| CommandStatus::from_byte(b)) {
                Some(CommandStatus::Complete) => {
                    // Some firmware closes an enumeration with a status
                    // instead of relying on the count alone.
                    if let Some(list) = self.list.take() {
                        self.frames = list.into_frames();
                    }
                    self.advance(CommandState::Idle);
                    CmdStep::Done(CmdResult::Success)
                }
                Some(CommandStatus::Accepted) => {
                    if self.action.command_type == CommandType::CommandWithChallengeAndAccept
                        && self.state == CommandState::CmdSent
                    {
                        self.advance(CommandState::CmdAccepted);
                    }
                    CmdStep::Pending
                }
                None => {
                    warn!(payload = %hex::encode(&frame.payload), "unknown status byte");
                    self.advance(CommandState::Idle);
                    CmdStep::Done(CmdResult::Failed)
                }
            };
        }

        if frame.command == Command::Challenge {
            // Stale challenge from a previous exchange.
            debug!("ignoring stray challenge");
            return CmdStep::Pending;
        }

        // During an enumeration only entry and count frames matter.
        if self.list.is_some() {
            debug!(command = ?frame.command, "dropping unrelated frame during enumeration");
            return CmdStep::Pending;
        }

        // A data frame answers the request directly.
        self.frames.push(frame);
        self.advance(CommandState::Idle);
        CmdStep::Done(CmdResult::Success)
    }

    fn finish_list_if_complete(&mut self) -> CmdStep {
        let complete = self.list.as_ref().is_some_and(|l| l.is_complete());
        if complete {
            let list = self.list.take().expect("checked above");
            self.frames = list.into_frames();
            self.advance(CommandState::Idle);
            CmdStep::Done(CmdResult::Success)
        } else {
            CmdStep::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylink_crypto::SharedSecret;

    fn trust() -> TrustAnchor {
        TrustAnchor {
            shared_secret: SharedSecret::from_bytes([0x33; 32]),
            authorization_id: [0xAA, 0xBB, 0xCC, 0xDD],
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn lock_frame(command: Command, payload: Vec<u8>) -> Bytes {
        encode_secure(
            &CommandFrame::new(command, payload),
            &trust().shared_secret,
            &generate_nonce(),
            [0, 0, 0, 0],
        )
    }

    fn lock_action() -> Action {
        Action {
            command: Command::LockAction,
            command_type: CommandType::CommandWithChallengeAndAccept,
            payload: vec![0x01, 0x00, 0x10, 0x00, 0x00],
        }
    }

    fn session(action: Action, pin: Option<u16>) -> CommandSession {
        CommandSession::new(action, trust(), pin, &config(), Instant::now())
    }

    fn decode_sent(wire: &Bytes) -> CommandFrame {
        decode_secure(wire, &trust().shared_secret).unwrap()
    }

    #[test]
    fn test_challenge_requested_first() {
        let mut s = session(lock_action(), None);
        let CmdStep::Send(wire) = s.start() else {
            panic!("expected send")
        };
        let frame = decode_sent(&wire);
        assert_eq!(frame.command, Command::RequestData);
        assert_eq!(frame.payload, Command::Challenge.code().to_le_bytes());
        assert_eq!(s.state(), CommandState::ChallengeSent);
    }

    #[test]
    fn test_challenge_becomes_envelope_nonce() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let challenge = [0x77u8; 32];
        let step = s.handle_frame(
            &lock_frame(Command::Challenge, challenge.to_vec()),
            Instant::now(),
        );
        let CmdStep::Send(wire) = step else {
            panic!("expected command send")
        };
        assert_eq!(&wire[..32], &challenge);
        let frame = decode_sent(&wire);
        assert_eq!(frame.command, Command::LockAction);
        // Original payload, then the echoed challenge.
        assert_eq!(&frame.payload[..5], &lock_action().payload[..]);
        assert_eq!(&frame.payload[5..], &challenge);
        assert_eq!(s.state(), CommandState::CmdSent);
    }

    #[test]
    fn test_accepted_then_complete_single_success() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![1; 32]), Instant::now());

        let step = s.handle_frame(&lock_frame(Command::Status, vec![0x01]), Instant::now());
        assert!(matches!(step, CmdStep::Pending));
        assert_eq!(s.state(), CommandState::CmdAccepted);

        let step = s.handle_frame(&lock_frame(Command::Status, vec![0x00]), Instant::now());
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));
    }

    #[test]
    fn test_complete_without_accepted_is_success() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![1; 32]), Instant::now());
        let step = s.handle_frame(&lock_frame(Command::Status, vec![0x00]), Instant::now());
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));
    }

    #[test]
    fn test_busy_error_classified() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let step = s.handle_frame(
            &lock_frame(Command::ErrorReport, vec![DeviceError::Busy.code(), 0x0D, 0x00]),
            Instant::now(),
        );
        assert!(matches!(step, CmdStep::Done(CmdResult::LockBusy)));
    }

    #[test]
    fn test_trust_rejection_classified() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let step = s.handle_frame(
            &lock_frame(
                Command::ErrorReport,
                vec![DeviceError::NotAuthorized.code(), 0x0D, 0x00],
            ),
            Instant::now(),
        );
        assert!(matches!(step, CmdStep::Done(CmdResult::NotPaired)));
    }

    #[test]
    fn test_pin_appended_to_payload() {
        let action = Action {
            command: Command::SetSecurityPin,
            command_type: CommandType::CommandWithChallengeAndPin,
            payload: vec![0x39, 0x30],
        };
        let mut s = session(action, Some(0x3039));
        let _ = s.start();
        let step = s.handle_frame(&lock_frame(Command::Challenge, vec![2; 32]), Instant::now());
        let CmdStep::Send(wire) = step else {
            panic!("expected command send")
        };
        let frame = decode_sent(&wire);
        assert_eq!(&frame.payload[frame.payload.len() - 2..], &[0x39, 0x30]);
    }

    #[test]
    fn test_missing_pin_fails_locally() {
        let action = Action {
            command: Command::SetConfig,
            command_type: CommandType::CommandWithChallengeAndPin,
            payload: vec![],
        };
        let mut s = session(action, None);
        assert!(matches!(s.start(), CmdStep::Done(CmdResult::Error)));
    }

    #[test]
    fn test_data_frame_completes_request() {
        let action = Action {
            command: Command::RequestConfig,
            command_type: CommandType::CommandWithChallenge,
            payload: vec![],
        };
        let mut s = session(action, None);
        let _ = s.start();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![3; 32]), Instant::now());
        let step = s.handle_frame(&lock_frame(Command::Config, vec![0x42; 20]), Instant::now());
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));
        let frames = s.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Config);
    }

    #[test]
    fn test_list_entries_any_order() {
        let action = Action {
            command: Command::RequestKeypadCodes,
            command_type: CommandType::CommandWithChallenge,
            payload: vec![],
        };
        let mut s = session(action, None);
        let _ = s.start();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![4; 32]), Instant::now());

        let now = Instant::now();
        let entry = |id: u8| lock_frame(Command::KeypadCode, vec![id, 0x00, 0x55]);
        assert!(matches!(s.handle_frame(&entry(1), now), CmdStep::Pending));
        let count = lock_frame(Command::KeypadCodeCount, vec![0x03, 0x00]);
        assert!(matches!(s.handle_frame(&count, now), CmdStep::Pending));
        assert!(matches!(s.handle_frame(&entry(2), now), CmdStep::Pending));
        let step = s.handle_frame(&entry(3), now);
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));
        assert_eq!(s.take_frames().len(), 3);
    }

    #[test]
    fn test_status_frames_do_not_extend_deadline() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let before = s.deadline();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![1; 32]), Instant::now());
        // A lock stuck replaying Accepted must not hold the session open.
        for _ in 0..5 {
            let step = s.handle_frame(&lock_frame(Command::Status, vec![0x01]), Instant::now());
            assert!(matches!(step, CmdStep::Pending));
        }
        assert_eq!(s.deadline(), before);
        assert_eq!(s.check_deadline(before), Some(CmdResult::TimeOut));
    }

    #[test]
    fn test_list_entry_frames_slide_deadline() {
        let action = Action {
            command: Command::RequestKeypadCodes,
            command_type: CommandType::CommandWithChallenge,
            payload: vec![],
        };
        let mut s = session(action, None);
        let _ = s.start();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![4; 32]), Instant::now());
        let before = s.deadline();
        let later = Instant::now() + Duration::from_secs(1);
        let entry = lock_frame(Command::KeypadCode, vec![1, 0, 0x55]);
        assert!(matches!(s.handle_frame(&entry, later), CmdStep::Pending));
        assert!(s.deadline() > before);
    }

    #[test]
    fn test_unrelated_frame_during_enumeration_dropped() {
        let action = Action {
            command: Command::RequestKeypadCodes,
            command_type: CommandType::CommandWithChallenge,
            payload: vec![],
        };
        let mut s = session(action, None);
        let _ = s.start();
        let now = Instant::now();
        let _ = s.handle_frame(&lock_frame(Command::Challenge, vec![5; 32]), now);

        let stray = lock_frame(Command::Config, vec![0x42; 8]);
        assert!(matches!(s.handle_frame(&stray, now), CmdStep::Pending));

        let count = lock_frame(Command::KeypadCodeCount, vec![0x01, 0x00]);
        let _ = s.handle_frame(&count, now);
        let step = s.handle_frame(&lock_frame(Command::KeypadCode, vec![1, 0, 0x55]), now);
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));

        let frames = s.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::KeypadCode);
    }

    #[test]
    fn test_garbled_frame_does_not_slide_deadline() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        let before = s.deadline();
        let step = s.handle_frame(&[0x00; 40], Instant::now());
        assert!(matches!(step, CmdStep::Pending));
        assert_eq!(s.deadline(), before);
    }

    #[test]
    fn test_deadline_expiry_is_timeout() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        assert_eq!(s.check_deadline(s.deadline()), Some(CmdResult::TimeOut));
        assert_eq!(s.state(), CommandState::TimeOut);
    }

    #[test]
    fn test_abort_is_timeout() {
        let mut s = session(lock_action(), None);
        let _ = s.start();
        assert_eq!(s.abort(), CmdResult::TimeOut);
        assert_eq!(s.state(), CommandState::TimeOut);
    }

    #[test]
    fn test_plain_command_type_sends_directly() {
        let action = Action {
            command: Command::RequestData,
            command_type: CommandType::Command,
            payload: Command::KeyturnerStates.code().to_le_bytes().to_vec(),
        };
        let mut s = session(action, None);
        let CmdStep::Send(wire) = s.start() else {
            panic!("expected send")
        };
        assert_eq!(decode_sent(&wire).command, Command::RequestData);
        assert_eq!(s.state(), CommandState::CmdSent);

        let step = s.handle_frame(
            &lock_frame(Command::KeyturnerStates, vec![0x00; 19]),
            Instant::now(),
        );
        assert!(matches!(step, CmdStep::Done(CmdResult::Success)));
    }
}
