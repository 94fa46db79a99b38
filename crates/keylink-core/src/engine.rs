//! The session engine.
//!
//! `LockEngine` owns the transport and the trust store and drives the
//! sans-IO state machines. Exactly one session can be active: the slot is
//! a tagged value behind an async mutex, and a command that finds the
//! slot taken resolves to `Working` immediately without queuing. The
//! engine suspends only while awaiting a reply frame or the connection;
//! everything else is straight-line code.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Notify;
use tokio::time::sleep_until;
use tracing::{debug, info, warn};

use crate::command::{CmdStep, CommandSession};
use crate::pairing::{PairingSession, PairingStep};
use crate::store::TrustStore;
use crate::transport::{ConnectionState, Transport, TransportEvent};
use crate::types::{
    Action, AppIdentity, CmdResponse, CmdResult, EngineConfig, PairingResult,
};

/// What currently occupies the engine.
pub enum SessionSlot {
    Idle,
    Pairing(PairingSession),
    Commanding(CommandSession),
}

/// Drives pairing and commands against one lock.
pub struct LockEngine<T: Transport, S: TrustStore> {
    transport: T,
    store: Arc<S>,
    identity: AppIdentity,
    config: EngineConfig,
    session: tokio::sync::Mutex<SessionSlot>,
    connection: Mutex<ConnectionState>,
    pin: Mutex<Option<u16>>,
    abort: Notify,
}

impl<T: Transport, S: TrustStore> LockEngine<T, S> {
    pub fn new(transport: T, store: Arc<S>, identity: AppIdentity, config: EngineConfig) -> Self {
        Self {
            transport,
            store,
            identity,
            config,
            session: tokio::sync::Mutex::new(SessionSlot::Idle),
            connection: Mutex::new(ConnectionState::Disconnected),
            pin: Mutex::new(None),
            abort: Notify::new(),
        }
    }

    /// Store the security PIN used by PIN-protected commands.
    pub fn set_security_pin(&self, pin: u16) {
        let mut guard = self.pin.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(pin);
    }

    /// Last connection state observed from the transport.
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_connection(&self, state: ConnectionState) {
        let mut guard = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if *guard != state {
            debug!(from = ?*guard, to = ?state, "connection state changed");
        }
        *guard = state;
    }

    fn security_pin(&self) -> Option<u16> {
        *self.pin.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the pairing handshake and persist the resulting trust record.
    ///
    /// Returns Success without touching the wire if already paired.
    /// Refuses to run concurrently with any other session.
    pub async fn pair(&self) -> PairingResult {
        let Ok(mut slot) = self.session.try_lock() else {
            debug!("session slot busy; refusing concurrent pairing");
            return PairingResult::Failed;
        };

        match self.store.load_trust() {
            Ok(Some(anchor)) => {
                debug!(auth_id = %hex::encode(anchor.authorization_id), "already paired");
                return PairingResult::Success;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "trust store unavailable");
                return PairingResult::Failed;
            }
        }

        let deadline = Instant::now() + self.config.pairing_timeout;
        *slot = SessionSlot::Pairing(PairingSession::new(self.identity.clone()));
        let result = self.drive_pairing(&mut slot, deadline).await;
        *slot = SessionSlot::Idle;
        result
    }

    async fn drive_pairing(&self, slot: &mut SessionSlot, deadline: Instant) -> PairingResult {
        let SessionSlot::Pairing(session) = slot else {
            return PairingResult::Failed;
        };

        if !self.await_connected(deadline).await {
            session.expire();
            return PairingResult::Timeout;
        }

        let mut step = session.start();
        loop {
            match step {
                PairingStep::Send(frame) => {
                    if let Err(err) = self.transport.send(frame).await {
                        warn!(%err, "pairing send failed");
                        return PairingResult::Failed;
                    }
                    step = PairingStep::Pending;
                }
                PairingStep::Pending => {
                    tokio::select! {
                        event = self.transport.next_event() => match event {
                            Some(TransportEvent::Frame(raw)) => {
                                match session.handle_frame(&raw) {
                                    Ok(next) => step = next,
                                    Err(err) => {
                                        warn!(%err, state = ?session.state(), "pairing failed");
                                        return PairingResult::Failed;
                                    }
                                }
                            }
                            Some(TransportEvent::Connection(state)) => {
                                self.set_connection(state);
                                if state != ConnectionState::Connected {
                                    session.expire();
                                    return PairingResult::Timeout;
                                }
                                step = PairingStep::Pending;
                            }
                            None => return PairingResult::Failed,
                        },
                        _ = sleep_until(deadline.into()) => {
                            session.expire();
                            return PairingResult::Timeout;
                        }
                        _ = self.abort.notified() => {
                            session.expire();
                            return PairingResult::Timeout;
                        }
                    }
                }
                PairingStep::Complete(anchor) => {
                    if let Err(err) = self.store.save_trust(&anchor) {
                        warn!(%err, "failed to persist trust record");
                        return PairingResult::Failed;
                    }
                    info!(auth_id = %hex::encode(anchor.authorization_id), "paired");
                    return PairingResult::Success;
                }
            }
        }
    }

    /// Execute one command against the paired lock.
    ///
    /// Resolves `Working` if another session holds the engine and
    /// `NotPaired` if no trust record exists; in both cases nothing is
    /// sent. Busy replies are retried up to the configured cap with a
    /// growing backoff.
    pub async fn execute_action(&self, action: Action) -> CmdResponse {
        let Ok(mut slot) = self.session.try_lock() else {
            debug!(command = ?action.command, "session slot busy");
            return CmdResponse::bare(CmdResult::Working);
        };

        let anchor = match self.store.load_trust() {
            Ok(Some(anchor)) => anchor,
            Ok(None) => {
                debug!(command = ?action.command, "not paired");
                return CmdResponse::bare(CmdResult::NotPaired);
            }
            Err(err) => {
                warn!(%err, "trust store unavailable");
                return CmdResponse::bare(CmdResult::Error);
            }
        };
        let pin = self.security_pin();

        let mut attempt: u32 = 0;
        loop {
            let session = CommandSession::new(
                action.clone(),
                anchor.clone(),
                pin,
                &self.config,
                Instant::now(),
            );
            *slot = SessionSlot::Commanding(session);
            let response = self.drive_command(&mut slot).await;
            *slot = SessionSlot::Idle;

            if response.result == CmdResult::LockBusy && attempt < self.config.busy_retry_cap {
                attempt += 1;
                let delay = self.config.busy_backoff_step * attempt;
                debug!(attempt, ?delay, command = ?action.command, "lock busy; backing off");
                tokio::time::sleep(delay).await;
                continue;
            }
            return response;
        }
    }

    async fn drive_command(&self, slot: &mut SessionSlot) -> CmdResponse {
        let SessionSlot::Commanding(session) = slot else {
            return CmdResponse::bare(CmdResult::Error);
        };

        if !self.await_connected(session.deadline()).await {
            return CmdResponse::bare(session.abort());
        }

        let mut step = session.start();
        loop {
            match step {
                CmdStep::Send(frame) => {
                    if let Err(err) = self.transport.send(frame).await {
                        warn!(%err, "command send failed");
                        return CmdResponse::bare(CmdResult::Failed);
                    }
                    step = CmdStep::Pending;
                }
                CmdStep::Pending => {
                    let deadline = session.deadline();
                    tokio::select! {
                        event = self.transport.next_event() => match event {
                            Some(TransportEvent::Frame(raw)) => {
                                step = session.handle_frame(&raw, Instant::now());
                            }
                            Some(TransportEvent::Connection(state)) => {
                                self.set_connection(state);
                                if state != ConnectionState::Connected {
                                    debug!("link dropped mid-command");
                                    return CmdResponse::bare(session.abort());
                                }
                                step = CmdStep::Pending;
                            }
                            None => return CmdResponse::bare(CmdResult::Error),
                        },
                        _ = sleep_until(deadline.into()) => {
                            if let Some(result) = session.check_deadline(Instant::now()) {
                                return CmdResponse {
                                    result,
                                    frames: session.take_frames(),
                                };
                            }
                            step = CmdStep::Pending;
                        }
                        _ = self.abort.notified() => {
                            debug!("command aborted");
                            return CmdResponse::bare(session.abort());
                        }
                    }
                }
                CmdStep::Done(result) => {
                    return CmdResponse {
                        result,
                        frames: session.take_frames(),
                    };
                }
            }
        }
    }

    /// Drop the pairing. Aborts any in-flight command, then clears the
    /// trust record.
    pub async fn unpair(&self) -> Result<(), crate::errors::StoreError> {
        self.abort.notify_waiters();
        let mut slot = self.session.lock().await;
        *slot = SessionSlot::Idle;
        self.store.clear_trust()?;
        info!("unpaired");
        Ok(())
    }

    /// Consume transport events until Connected or the deadline.
    ///
    /// Frames that arrive while not connected are stale and dropped.
    async fn await_connected(&self, deadline: Instant) -> bool {
        if self.connection_state() == ConnectionState::Connected {
            return true;
        }
        debug!("awaiting connection");
        loop {
            tokio::select! {
                event = self.transport.next_event() => match event {
                    Some(TransportEvent::Connection(state)) => {
                        self.set_connection(state);
                        if state == ConnectionState::Connected {
                            return true;
                        }
                    }
                    Some(TransportEvent::Frame(_)) => {
                        debug!("dropping frame while not connected");
                    }
                    None => return false,
                },
                _ = sleep_until(deadline.into()) => return false,
            }
        }
    }
}
