//! CTAPHID transaction manager
//!
//! Owns the single message in flight. Reports from the host go through
//! [`TransactionManager::handle_report`]; every response, error and keepalive
//! goes out through the [`ReportSink`].
//!
//! - Init and Cancel are answered at once, whatever else is going on.
//! - Any other command starts a message, which is reassembled, dispatched
//!   and then released. While it is active every other channel is busy.
//! - U2F requests that need the user are answered with
//!   CONDITIONS_NOT_SATISFIED and finished when the client repeats them.
//! - CTAP2 requests run on a worker thread with a keepalive ticker.

use crate::config::TransactionConfig;
use crate::continuation::{Presence, U2fContinuation};
use crate::error::Result;
use crate::keepalive::Keepalive;
use crate::listener::{Event, U2fListener, WebAuthnListener};
use crate::sink::ReportSink;
use crate::timer::{Generation, Timer};

use authorizer_ctap::{
    Authenticator, AuthenticatorCallbacks, AuthenticatorConfig, CancelToken, InternalStatus,
    StatusCode, StatusWord, U2fKind,
};
use authorizer_transport::channel::RESERVED_CID;
use authorizer_transport::ctaphid::{BROADCAST_CID, INIT_NONCE_SIZE};
use authorizer_transport::{
    Append, ChannelAllocator, Cmd, Error as FramingError, InMessage, InitResponse,
    KeepaliveStatus, Message, Packet,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, error, info, trace, warn};

/// CTAP2 commands whose success is announced to listeners
const MAKE_CREDENTIAL: u8 = 0x01;
const GET_ASSERTION: u8 = 0x02;

/// A CTAP2 command running on a worker
#[derive(Debug)]
struct CborJob {
    id: u64,
    cid: u32,
    token: CancelToken,
    _keepalive: Keepalive,
}

/// The message in flight
#[derive(Debug)]
enum Active {
    Receiving(InMessage),
    Processing(CborJob),
}

impl Active {
    fn cid(&self) -> u32 {
        match self {
            Active::Receiving(message) => message.cid(),
            Active::Processing(job) => job.cid,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    allocator: ChannelAllocator,
    active: Option<Active>,
    continuation: Option<U2fContinuation>,
    next_job: u64,
    /// Abandoned CTAP2 command whose worker has not returned yet
    draining: Option<u64>,
}

#[derive(Default)]
struct Listeners {
    webauthn: Option<Arc<dyn WebAuthnListener>>,
    u2f: Option<Arc<dyn U2fListener>>,
}

struct Inner<C: AuthenticatorCallbacks> {
    authenticator: Arc<Authenticator<C>>,
    sink: Arc<dyn ReportSink>,
    config: TransactionConfig,
    state: Mutex<State>,
    listeners: Mutex<Listeners>,
    message_timer: Timer,
    retry_timer: Timer,
}

/// Drives one authenticator over CTAPHID
///
/// # Example
///
/// ```
/// use authorizer::{RecordingSink, TransactionConfig, TransactionManager};
/// use authorizer_ctap::{Answer, AuthenticatorConfig, CallbackSet, MemoryCredentialSafe, ScriptedInteraction};
/// use std::sync::Arc;
///
/// let callbacks = CallbackSet::new(ScriptedInteraction::new(Answer::Accept), MemoryCredentialSafe::new());
/// let sink = RecordingSink::new();
/// let manager = TransactionManager::with_callbacks(
///     AuthenticatorConfig::default(),
///     callbacks,
///     Arc::new(sink.clone()),
///     TransactionConfig::default(),
/// )?;
///
/// // Allocate a channel
/// let mut report = [0u8; 64];
/// report[..4].copy_from_slice(&[0xFF; 4]);
/// report[4] = 0x86;
/// report[6] = 8;
/// manager.handle_report(&report)?;
/// assert_eq!(sink.messages()[0].data.len(), 17);
/// # Ok::<(), authorizer::Error>(())
/// ```
pub struct TransactionManager<C: AuthenticatorCallbacks + 'static> {
    inner: Arc<Inner<C>>,
}

impl<C: AuthenticatorCallbacks + 'static> TransactionManager<C> {
    /// Create a manager and start its timer threads
    pub fn new(
        authenticator: Arc<Authenticator<C>>,
        sink: Arc<dyn ReportSink>,
        config: TransactionConfig,
    ) -> Result<Self> {
        let inner = Arc::new(Inner {
            authenticator,
            sink,
            config,
            state: Mutex::default(),
            listeners: Mutex::default(),
            message_timer: Timer::new("message-timeout"),
            retry_timer: Timer::new("u2f-retry"),
        });

        let weak = Arc::downgrade(&inner);
        inner.message_timer.start(move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.message_timed_out(generation);
            }
        })?;

        let weak = Arc::downgrade(&inner);
        inner.retry_timer.start(move |generation| {
            if let Some(inner) = weak.upgrade() {
                inner.retry_timed_out(generation);
            }
        })?;

        Ok(Self { inner })
    }

    /// Create the authenticator and its manager in one go
    pub fn with_callbacks(
        authenticator_config: AuthenticatorConfig,
        callbacks: C,
        sink: Arc<dyn ReportSink>,
        config: TransactionConfig,
    ) -> Result<Self> {
        let authenticator = Authenticator::new(authenticator_config, callbacks)?;
        Self::new(Arc::new(authenticator), sink, config)
    }

    pub fn authenticator(&self) -> &Arc<Authenticator<C>> {
        &self.inner.authenticator
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    /// Register the listener for successful CTAP2 operations
    pub fn set_webauthn_listener(&self, listener: Arc<dyn WebAuthnListener>) {
        self.inner.listeners().webauthn = Some(listener);
    }

    /// Register the listener for released U2F operations
    pub fn set_u2f_listener(&self, listener: Arc<dyn U2fListener>) {
        self.inner.listeners().u2f = Some(listener);
    }

    /// Process one report from the host
    ///
    /// A rejected report has already been answered with a CTAPHID error
    /// when this returns the error.
    pub fn handle_report(&self, report: &[u8]) -> Result<()> {
        self.inner.handle_report(report)
    }

    /// Whether a message, a U2F presence check or an abandoned CTAP2
    /// command is in flight
    pub fn is_busy(&self) -> bool {
        let state = self.inner.lock();
        state.active.is_some() || state.continuation.is_some() || state.draining.is_some()
    }

    /// Drop the message in flight and any pending presence check
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        info!("Resetting transaction state");
        self.inner.reset_active(&mut state);
        if let Some(continuation) = state.continuation.take() {
            self.inner.abandon(continuation);
        }
    }
}

impl<C: AuthenticatorCallbacks + 'static> std::fmt::Debug for TransactionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl<C: AuthenticatorCallbacks + 'static> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, message: Message) {
        match message.to_packets() {
            Ok(packets) => {
                for packet in packets {
                    self.sink.send(packet.as_bytes());
                }
            }
            Err(e) => {
                error!(cid = message.cid, len = message.data.len(), "Response too large");
                self.send_error(e);
            }
        }
    }

    fn send_error(&self, error: FramingError) {
        self.sink.send(error.to_packet().as_bytes());
    }

    fn handle_report(self: &Arc<Self>, report: &[u8]) -> Result<()> {
        let outcome = {
            let mut state = self.lock();
            let outcome =
                Packet::from_report(report).and_then(|packet| self.handle_packet(&mut state, &packet));
            if let Err(e) = outcome {
                self.fail(&mut state, e);
            }
            outcome
        };

        match outcome {
            Ok(Some(event)) => {
                self.notify(event);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Answer a framing error on its channel
    ///
    /// A message still being received on that channel is dropped; a running
    /// command is not.
    fn fail(&self, state: &mut State, error: FramingError) {
        warn!(cid = error.cid(), %error, "Rejecting packet");
        if matches!(&state.active, Some(Active::Receiving(m)) if m.cid() == error.cid()) {
            self.reset_active(state);
        }
        self.send_error(error);
    }

    fn reset_active(&self, state: &mut State) {
        self.message_timer.disarm();
        if let Some(Active::Processing(job)) = state.active.take() {
            debug!(cid = job.cid, job = job.id, "Abandoning running CTAP2 command");
            self.authenticator.cancel_command(&job.token);
            state.draining = Some(job.id);
        }
    }

    fn handle_packet(
        self: &Arc<Self>,
        state: &mut State,
        packet: &Packet,
    ) -> std::result::Result<Option<Event>, FramingError> {
        let cid = packet.cid();
        if cid == RESERVED_CID {
            return Err(FramingError::InvalidCommand { cid });
        }

        if !packet.is_init() {
            if cid == BROADCAST_CID {
                return Err(FramingError::InvalidChannel { cid });
            }
            return Ok(self.continue_message(state, packet));
        }

        match packet.cmd() {
            Some(Cmd::Init) => {
                self.init(state, packet)?;
                Ok(None)
            }
            Some(Cmd::Cancel) => {
                self.cancel(state, cid);
                Ok(None)
            }
            // Only INIT and CANCEL may use the broadcast channel
            Some(_) if cid == BROADCAST_CID => Err(FramingError::InvalidChannel { cid }),
            Some(_) => self.start_message(state, packet),
            None => Err(FramingError::InvalidCommand { cid }),
        }
    }

    fn init(&self, state: &mut State, packet: &Packet) -> std::result::Result<(), FramingError> {
        let cid = packet.cid();
        if packet.payload_len() != Some(INIT_NONCE_SIZE as u16) {
            return Err(FramingError::InvalidLength { cid });
        }

        if state.active.as_ref().is_some_and(|a| a.cid() == cid) {
            info!(cid, "Resynchronizing active channel");
            self.reset_active(state);
        }

        let new_cid = if cid == BROADCAST_CID {
            state.allocator.allocate()
        } else {
            cid
        };

        let mut nonce = [0u8; INIT_NONCE_SIZE];
        nonce.copy_from_slice(&packet.payload()[..INIT_NONCE_SIZE]);
        debug!(cid, new_cid, "Channel initialized");

        let response = InitResponse::new(nonce, new_cid, self.authenticator.config().wink);
        self.send(Message::new(cid, Cmd::Init, response.to_bytes()));
        Ok(())
    }

    fn cancel(&self, state: &mut State, cid: u32) {
        if let Some(continuation) = state.continuation.take_if(|c| c.cid() == cid) {
            info!(cid, "Cancelling U2F presence check");
            self.abandon(continuation);
        }

        let processing = match &state.active {
            Some(active) if active.cid() == cid => matches!(active, Active::Processing(_)),
            // Spurious cancels are silently ignored
            _ => {
                trace!(cid, "Ignoring cancel for inactive channel");
                return;
            }
        };

        info!(cid, "Cancelling current transaction");
        if processing {
            if let Some(Active::Processing(job)) = &state.active {
                self.authenticator.cancel_command(&job.token);
            }
        } else {
            state.active = None;
            self.message_timer.disarm();
        }
    }

    fn start_message(
        self: &Arc<Self>,
        state: &mut State,
        packet: &Packet,
    ) -> std::result::Result<Option<Event>, FramingError> {
        let cid = packet.cid();
        if let Some(active) = &state.active {
            return Err(if active.cid() == cid {
                FramingError::InvalidSequence { cid }
            } else {
                FramingError::ChannelBusy { cid }
            });
        }

        let message = InMessage::start(packet)?;
        trace!(cid, cmd = ?message.cmd(), remaining = message.remaining(), "Message started");
        state.active = Some(Active::Receiving(message));
        Ok(self.advance(state))
    }

    fn continue_message(self: &Arc<Self>, state: &mut State, packet: &Packet) -> Option<Event> {
        let accepted = match state.active.as_mut() {
            Some(Active::Receiving(message)) => message.append(packet) == Append::Accepted,
            _ => false,
        };

        // Spurious continuation packets are dropped without timeout renewal
        if !accepted {
            trace!(cid = packet.cid(), seq = ?packet.seq(), "Dropping continuation packet");
            return None;
        }
        self.advance(state)
    }

    /// Dispatch the active message once complete, otherwise re-arm its timeout
    fn advance(self: &Arc<Self>, state: &mut State) -> Option<Event> {
        let complete = matches!(&state.active, Some(Active::Receiving(m)) if m.is_complete());
        if !complete {
            self.message_timer.arm(self.config.continuation_timeout);
            return None;
        }

        self.message_timer.disarm();
        match state.active.take() {
            Some(Active::Receiving(message)) => self.dispatch(state, message.into_message()),
            _ => None,
        }
    }

    fn dispatch(self: &Arc<Self>, state: &mut State, message: Message) -> Option<Event> {
        let cid = message.cid;
        debug_assert!(
            !matches!(message.cmd, Cmd::Init | Cmd::Cancel),
            "control command dispatched as a message"
        );
        debug!(cid, cmd = ?message.cmd, len = message.data.len(), "Handling complete message");

        // Nothing reaches the authenticator until an abandoned command returns
        if matches!(message.cmd, Cmd::Msg | Cmd::Cbor) && state.draining.is_some() {
            info!(cid, job = ?state.draining, "Abandoned CTAP2 command still running");
            self.send_error(FramingError::ChannelBusy { cid });
            return None;
        }

        match message.cmd {
            Cmd::Ping => {
                self.send(Message::new(cid, Cmd::Ping, message.data));
                None
            }
            Cmd::Wink if self.authenticator.config().wink => {
                info!(cid, "Wink");
                self.send(Message::new(cid, Cmd::Wink, Vec::new()));
                None
            }
            Cmd::Msg => self.handle_msg(state, message),
            Cmd::Cbor => {
                self.start_cbor(state, message);
                None
            }
            Cmd::Init | Cmd::Cancel => {
                error!(cid, cmd = ?message.cmd, "Control command reached message dispatch");
                self.send_error(FramingError::InvalidCommand { cid });
                None
            }
            Cmd::Wink | Cmd::Lock | Cmd::Keepalive | Cmd::Error => {
                self.send_error(FramingError::InvalidCommand { cid });
                None
            }
        }
    }

    fn handle_msg(&self, state: &mut State, message: Message) -> Option<Event> {
        let cid = message.cid;

        // A repeat of the request that is waiting for the user polls it;
        // anything else abandons it
        if let Some(continuation) = state.continuation.take() {
            if continuation.is_retry(&message) {
                return self.poll_continuation(state, continuation);
            }
            info!(cid, "Received new message, cancelling presence check");
            self.abandon(continuation);
        }

        let response = match self.authenticator.handle_u2f(&message.data) {
            Err(status) => {
                debug!(cid, %status, "U2F request failed");
                status.to_bytes().to_vec()
            }
            Ok(reply) if reply.needs_presence => {
                info!(cid, kind = ?reply.kind, "User presence required; expecting client to retry");
                let presence = self.authenticator.u2f_presence_prompt(&reply);
                state.continuation = Some(U2fContinuation::new(message, presence, reply));
                self.retry_timer.arm(self.config.u2f_retry_timeout);
                StatusWord::ConditionsNotSatisfied.to_bytes().to_vec()
            }
            Ok(reply) => reply.to_bytes(),
        };

        self.send(Message::new(cid, Cmd::Msg, response));
        None
    }

    fn poll_continuation(&self, state: &mut State, continuation: U2fContinuation) -> Option<Event> {
        let cid = continuation.cid();
        let not_satisfied = StatusWord::ConditionsNotSatisfied.to_bytes().to_vec();

        match continuation.poll(self.authenticator.user_presence_timeout()) {
            Presence::Pending => {
                // Still waiting for user confirmation; let the client retry
                self.retry_timer.arm(self.config.u2f_retry_timeout);
                state.continuation = Some(continuation);
                self.send(Message::new(cid, Cmd::Msg, not_satisfied));
                None
            }
            Presence::Cancelled => {
                warn!(cid, "Presence check already cancelled");
                self.retry_timer.disarm();
                self.authenticator.rollback_u2f(continuation.reply());
                None
            }
            Presence::Denied => {
                info!(cid, "User presence denied");
                self.retry_timer.disarm();
                self.authenticator.rollback_u2f(continuation.reply());
                self.send(Message::new(cid, Cmd::Msg, not_satisfied));
                None
            }
            Presence::Accepted => {
                self.retry_timer.disarm();
                let reply = continuation.reply();
                info!(cid, kind = ?reply.kind, "User presence confirmed");
                self.send(Message::new(cid, Cmd::Msg, reply.to_bytes()));
                match reply.kind {
                    U2fKind::Register => Some(Event::U2fRegister),
                    U2fKind::Authenticate => Some(Event::U2fAuthenticate),
                    U2fKind::Version => None,
                }
            }
        }
    }

    /// Drop a continuation without answering it
    fn abandon(&self, continuation: U2fContinuation) {
        self.retry_timer.disarm();
        continuation.cancel();
        self.authenticator.rollback_u2f(continuation.reply());
    }

    fn start_cbor(self: &Arc<Self>, state: &mut State, message: Message) {
        let cid = message.cid;
        let id = state.next_job;
        state.next_job += 1;
        let token = CancelToken::new();

        let weak = Arc::downgrade(self);
        let keepalive = match Keepalive::start(self.config.keepalive_interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.keepalive(id);
            }
        }) {
            Ok(keepalive) => keepalive,
            Err(e) => {
                error!(cid, %e, "Failed to start keepalive");
                self.send_error(FramingError::Other { cid });
                return;
            }
        };

        // The worker cannot report back before this returns: it needs the
        // state lock the caller is holding
        let worker = Arc::clone(self);
        let worker_token = token.clone();
        let spawned = thread::Builder::new()
            .name("authorizer-cbor".to_string())
            .spawn(move || {
                let command = message.data.first().copied();
                let response = worker
                    .authenticator
                    .handle_cancellable_command(&message.data, worker_token);
                worker.finish_cbor(id, command, response);
            });

        match spawned {
            Ok(_) => {
                debug!(cid, job = id, "CTAP2 command started");
                state.active = Some(Active::Processing(CborJob {
                    id,
                    cid,
                    token,
                    _keepalive: keepalive,
                }));
            }
            Err(e) => {
                error!(cid, %e, "Failed to start CTAP2 worker");
                self.send_error(FramingError::Other { cid });
            }
        }
    }

    fn finish_cbor(&self, id: u64, command: Option<u8>, response: Vec<u8>) {
        let event = {
            let mut state = self.lock();
            let job = match state.active.take() {
                Some(Active::Processing(job)) if job.id == id => job,
                other => {
                    state.active = other;
                    if state.draining == Some(id) {
                        state.draining = None;
                    }
                    debug!(job = id, "Dropping result of abandoned CTAP2 command");
                    return;
                }
            };

            let response = if job.token.is_cancelled() {
                info!(cid = job.cid, "CTAP2 command cancelled");
                vec![StatusCode::KeepaliveCancel.to_u8()]
            } else {
                response
            };
            let succeeded = response.first() == Some(&StatusCode::Success.to_u8());
            debug!(cid = job.cid, status = response.first().copied(), "CTAP2 command finished");
            self.send(Message::new(job.cid, Cmd::Cbor, response));

            match command {
                Some(MAKE_CREDENTIAL) if succeeded => Some(Event::MakeCredential),
                Some(GET_ASSERTION) if succeeded => Some(Event::GetAssertion),
                _ => None,
            }
        };

        if let Some(event) = event {
            self.notify(event);
        }
    }

    fn keepalive(&self, id: u64) {
        let state = self.lock();
        let Some(Active::Processing(job)) = &state.active else {
            return;
        };
        if job.id != id || job.token.is_cancelled() {
            return;
        }

        let status = match self.authenticator.internal_status() {
            InternalStatus::Idle => KeepaliveStatus::Idle,
            InternalStatus::Processing => KeepaliveStatus::Processing,
            InternalStatus::WaitingForUserPresence => KeepaliveStatus::UserPresenceNeeded,
        };
        trace!(cid = job.cid, ?status, "Keepalive");
        self.sink.send(Packet::keepalive(job.cid, status).as_bytes());
    }

    fn message_timed_out(&self, generation: Generation) {
        let mut state = self.lock();
        if !self.message_timer.is_current(generation) {
            return;
        }
        let cid = match &state.active {
            Some(Active::Receiving(message)) => message.cid(),
            _ => return,
        };

        warn!(cid, "Message timed out");
        state.active = None;
        self.send_error(FramingError::MessageTimeout { cid });
    }

    fn retry_timed_out(&self, generation: Generation) {
        let mut state = self.lock();
        if !self.retry_timer.is_current(generation) {
            return;
        }
        if let Some(continuation) = state.continuation.take() {
            warn!(cid = continuation.cid(), "Request requiring user confirmation timed out");
            self.abandon(continuation);
        }
    }

    fn notify(&self, event: Event) {
        let (webauthn, u2f) = {
            let listeners = self.listeners();
            (listeners.webauthn.clone(), listeners.u2f.clone())
        };

        match (event, webauthn, u2f) {
            (Event::MakeCredential, Some(listener), _) => listener.on_make_credential(),
            (Event::GetAssertion, Some(listener), _) => listener.on_get_assertion(),
            (Event::U2fRegister, _, Some(listener)) => listener.on_u2f_register(),
            (Event::U2fAuthenticate, _, Some(listener)) => listener.on_u2f_authenticate(),
            // Absent listeners are not an error
            _ => {}
        }
    }
}
