//! CTAP Authenticator state machine
//!
//! This module holds the authenticator configuration and the state shared by
//! every command: the PIN locker, the power-cycle session, the internal
//! status reported through keepalives and the prompt currently shown to the
//! user.

use crate::{
    callbacks::{AuthenticatorCallbacks, ConsentRequest, PromptKind},
    facets::KnownFacets,
    pin_locker::{self, MAX_PIN_RETRIES, MIN_PIN_LENGTH, MemoryPinStore, PinLocker, PinStore},
    prompt::{Canceller, Outcome, PendingPrompt},
    session::{MAX_CONSECUTIVE_MISMATCHES, Session},
    status::{Result, StatusCode},
    types::CredentialSource,
};

use authorizer_crypto::pin_protocol::v1;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default AAGUID ("authorizer-fido2")
pub const DEFAULT_AAGUID: [u8; 16] = *b"authorizer-fido2";

/// Largest CTAP2 request body accepted
pub const DEFAULT_MAX_MSG_SIZE: usize = 4096;

/// How long a consent prompt may stay unanswered
pub const DEFAULT_USER_PRESENCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticator configuration
///
/// Defines what the authenticator reports through authenticatorGetInfo and
/// how long it waits for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatorConfig {
    /// Authenticator Attestation GUID (16 bytes)
    pub aaguid: [u8; 16],

    /// Maximum CTAP2 message size, excluding the command byte
    pub max_msg_size: usize,

    /// Maximum number of credentials in an allow or exclude list
    pub max_credential_count_in_list: usize,

    /// Maximum credential ID length
    pub max_credential_id_length: usize,

    /// Transports supported
    pub transports: Vec<String>,

    /// Whether CTAPHID WINK is advertised
    pub wink: bool,

    /// U2F application ids that resolve to a readable relying party
    pub known_facets: KnownFacets,

    /// How long a consent dialog or prompt may stay unanswered
    pub user_presence_timeout: Duration,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthenticatorConfig {
    /// Create a new authenticator configuration with defaults
    pub fn new() -> Self {
        Self {
            aaguid: DEFAULT_AAGUID,
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            max_credential_count_in_list: 5,
            max_credential_id_length: 256,
            transports: vec!["usb".to_string()],
            wink: false,
            known_facets: KnownFacets::default(),
            user_presence_timeout: DEFAULT_USER_PRESENCE_TIMEOUT,
        }
    }

    /// Set AAGUID
    pub fn with_aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = aaguid;
        self
    }

    /// Set maximum message size
    pub fn with_max_msg_size(mut self, size: usize) -> Self {
        self.max_msg_size = size;
        self
    }

    pub fn with_max_credential_count_in_list(mut self, count: usize) -> Self {
        self.max_credential_count_in_list = count;
        self
    }

    pub fn with_max_credential_id_length(mut self, length: usize) -> Self {
        self.max_credential_id_length = length;
        self
    }

    /// Set transports
    pub fn with_transports(mut self, transports: Vec<String>) -> Self {
        self.transports = transports;
        self
    }

    /// Advertise CTAPHID WINK
    pub fn with_wink(mut self, wink: bool) -> Self {
        self.wink = wink;
        self
    }

    pub fn with_known_facets(mut self, facets: KnownFacets) -> Self {
        self.known_facets = facets;
        self
    }

    /// Set how long prompts wait for an answer
    pub fn with_user_presence_timeout(mut self, timeout: Duration) -> Self {
        self.user_presence_timeout = timeout;
        self
    }
}

/// What the authenticator is doing, as reported by keepalives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InternalStatus {
    Idle = 0,
    Processing = 1,
    WaitingForUserPresence = 2,
}

impl InternalStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Processing,
            2 => Self::WaitingForUserPresence,
            _ => Self::Idle,
        }
    }
}

/// Cancellation flag of one command
///
/// Whoever starts a command keeps a clone; cancelling it before the command
/// reaches its first prompt means no prompt is ever shown.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// CTAP2 / U2F authenticator
///
/// All methods take `&self` so one instance can be shared between the
/// transport thread and a command worker.
pub struct Authenticator<C: AuthenticatorCallbacks> {
    config: AuthenticatorConfig,
    callbacks: C,
    pin: Mutex<PinLocker>,
    session: Mutex<Session>,
    status: AtomicU8,
    pending: Mutex<Option<Canceller>>,
    command: Mutex<CancelToken>,
}

impl<C: AuthenticatorCallbacks> Authenticator<C> {
    /// Create an authenticator whose PIN state lives only in memory
    pub fn new(config: AuthenticatorConfig, callbacks: C) -> Result<Self> {
        Self::with_pin_store(config, callbacks, Box::new(MemoryPinStore::new()))
    }

    /// Create an authenticator with persisted PIN state
    pub fn with_pin_store(
        config: AuthenticatorConfig,
        callbacks: C,
        store: Box<dyn PinStore>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            callbacks,
            pin: Mutex::new(PinLocker::new(store)?),
            session: Mutex::new(Session::new()),
            status: AtomicU8::new(InternalStatus::Idle as u8),
            pending: Mutex::new(None),
            command: Mutex::new(CancelToken::new()),
        })
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn user_presence_timeout(&self) -> Duration {
        self.config.user_presence_timeout
    }

    pub fn internal_status(&self) -> InternalStatus {
        InternalStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: InternalStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Mark the start of a command cancelled through `token`
    pub(crate) fn begin_command(&self, token: CancelToken) {
        *self.command.lock().unwrap_or_else(PoisonError::into_inner) = token;
        self.set_status(InternalStatus::Processing);
    }

    fn is_cancelled(&self) -> bool {
        self.command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_cancelled()
    }

    pub(crate) fn end_command(&self) {
        *self.command.lock().unwrap_or_else(PoisonError::into_inner) = CancelToken::new();
        self.set_status(InternalStatus::Idle);
    }

    /// Cancel the command started with `token`
    ///
    /// The command raises no further prompts and the one it is waiting on is
    /// withdrawn. Leaves the prompt alone if another command is running by now.
    pub fn cancel_command(&self, token: &CancelToken) {
        token.cancel();
        let current = self
            .command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .same(token);
        if current {
            self.withdraw_prompt();
        }
    }

    fn withdraw_prompt(&self) {
        let canceller = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(canceller) = canceller {
            debug!("Cancelling pending prompt");
            canceller.cancel();
        }
    }

    pub(crate) fn pin(&self) -> MutexGuard<'_, PinLocker> {
        self.pin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the user to answer a prompt
    ///
    /// Returns `None` if the prompt was cancelled, dropped or not answered in
    /// time.
    pub(crate) fn await_prompt<T: Clone + Send + 'static>(
        &self,
        pending: PendingPrompt<T>,
    ) -> Option<T> {
        self.set_status(InternalStatus::WaitingForUserPresence);
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(pending.canceller());
        if self.is_cancelled() {
            pending.cancel();
        }

        let outcome = pending.wait_timeout(self.config.user_presence_timeout);

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_status(InternalStatus::Processing);

        match outcome {
            Outcome::Resolved(value) => Some(value),
            Outcome::Pending => {
                info!("User did not answer in time");
                pending.cancel();
                None
            }
            Outcome::Cancelled => None,
        }
    }

    /// Ask a yes/no question through a dialog
    pub(crate) fn confirm_dialog(&self, request: &ConsentRequest) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let pending = self.callbacks.show_dialog(request);
        self.await_prompt(pending).unwrap_or(false)
    }

    /// Ask for confirmation through a biometric-style prompt
    pub(crate) fn confirm_prompt(&self, request: &ConsentRequest) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let pending = self.callbacks.show_prompt(request);
        self.await_prompt(pending).unwrap_or(false)
    }

    pub fn is_pin_set(&self) -> bool {
        self.pin().is_pin_set()
    }

    pub fn pin_retries(&self) -> u8 {
        self.pin().retries()
    }

    /// Public half of the key agreement pair as COSE coordinates
    pub fn key_agreement_public(&self) -> ([u8; 32], [u8; 32]) {
        self.session().key_agreement().public_key_cose()
    }

    /// SHA-256 of the ECDH x coordinate with a platform key
    pub(crate) fn shared_secret(&self, x: &[u8], y: &[u8]) -> Result<[u8; 32]> {
        Ok(self.session().key_agreement().shared_secret_cose(x, y)?)
    }

    /// Whether consecutive mismatches block PIN use until power cycle
    pub(crate) fn is_pin_auth_blocked(&self) -> bool {
        self.session().is_pin_auth_blocked()
    }

    fn pin_matched(&self) -> Result<()> {
        self.session().clear_mismatches();
        self.pin().set_retries(MAX_PIN_RETRIES)
    }

    /// Book-keeping after a wrong PIN; returns the error to report
    fn pin_mismatch(&self, invalid: StatusCode) -> StatusCode {
        self.session().regenerate_key_agreement();

        let remaining = match self.pin().decrement_retries() {
            Ok(remaining) => remaining,
            Err(status) => return status,
        };
        if remaining == 0 {
            warn!("PIN retries exhausted");
            return StatusCode::PinBlocked;
        }

        let mismatches = self.session().record_mismatch();
        debug!(mismatches, remaining, "PIN mismatch");
        if mismatches == MAX_CONSECUTIVE_MISMATCHES {
            warn!("PIN auth blocked until power cycle");
            self.confirm_prompt(&ConsentRequest::new(PromptKind::PinAuthBlocked));
            return StatusCode::PinAuthBlocked;
        }

        invalid
    }

    /// Check an encrypted PIN hash against the stored one
    pub(crate) fn verify_pin_hash_enc(
        &self,
        shared_secret: &[u8; 32],
        pin_hash_enc: &[u8],
    ) -> Result<()> {
        let pin_hash = v1::decrypt(shared_secret, pin_hash_enc)?;

        if self.pin().is_pin_match(&pin_hash) {
            self.pin_matched()
        } else {
            Err(self.pin_mismatch(StatusCode::PinInvalid))
        }
    }

    /// Check pinAuth = LEFT(HMAC(pinToken, clientDataHash), 16)
    ///
    /// Returns whether the user was verified. Without a pinAuth the request
    /// passes unverified when a PIN is set and `pin_required` is false, and
    /// passes verified when no PIN is set at all.
    pub(crate) fn verify_pin_auth(
        &self,
        pin_auth: Option<&[u8]>,
        client_data_hash: &[u8],
        pin_required: bool,
    ) -> Result<bool> {
        match pin_auth {
            Some([]) => {
                self.confirm_prompt(&ConsentRequest::new(PromptKind::PinNotSet));
                if self.is_pin_set() {
                    Err(StatusCode::PinInvalid)
                } else {
                    Err(StatusCode::PinNotSet)
                }
            }
            Some(pin_auth) => {
                let token = *self.pin().token();
                if v1::verify(&token, client_data_hash, pin_auth) {
                    self.pin_matched()?;
                    Ok(true)
                } else {
                    Err(self.pin_mismatch(StatusCode::PinAuthInvalid))
                }
            }
            None if self.is_pin_set() => {
                if pin_required {
                    Err(StatusCode::PinRequired)
                } else {
                    Ok(false)
                }
            }
            None => Ok(true),
        }
    }

    /// Decrypt newPinEnc and store it as the PIN
    pub(crate) fn store_new_pin(&self, shared_secret: &[u8; 32], new_pin_enc: &[u8]) -> Result<()> {
        let padded = v1::decrypt(shared_secret, new_pin_enc)?;
        let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());

        let pin = core::str::from_utf8(&padded[..end]).map_err(|_| StatusCode::PinInvalid)?;
        if pin.chars().count() < MIN_PIN_LENGTH {
            return Err(StatusCode::PinPolicyViolation);
        }

        let mut locker = self.pin();
        locker.set_retries(MAX_PIN_RETRIES)?;
        locker.lock_pin(pin_locker::pin_hash(pin.as_bytes()))?;
        info!("New PIN stored");
        Ok(())
    }

    /// authenticatorReset: wipe credentials and PIN after confirmation
    pub fn reset(&self) -> Result<()> {
        if !self.confirm_prompt(&ConsentRequest::new(PromptKind::Reset)) {
            return Err(StatusCode::OperationDenied);
        }

        self.callbacks.delete_all_credentials()?;
        self.pin().reset()?;
        {
            let mut session = self.session();
            session.take_preflight();
            session.clear_mismatches();
        }
        info!("Authenticator reset");
        Ok(())
    }

    /// Forget the PIN after the user confirms
    pub fn reset_pin(&self) -> Result<()> {
        if !self.confirm_prompt(&ConsentRequest::new(PromptKind::ResetPin)) {
            return Err(StatusCode::OperationDenied);
        }
        self.pin().reset()
    }

    /// Set or change the PIN from the host side
    ///
    /// The same policy as ClientPIN applies: at least four characters, and
    /// the current PIN is required when one is set. A wrong current PIN
    /// costs a retry.
    pub fn set_pin_locally(&self, new_pin: &str, old_pin: Option<&str>) -> Result<()> {
        if new_pin.chars().count() < MIN_PIN_LENGTH {
            return Err(StatusCode::PinPolicyViolation);
        }
        if !self.confirm_prompt(&ConsentRequest::new(PromptKind::ChangePin)) {
            return Err(StatusCode::OperationDenied);
        }

        let mut locker = self.pin();
        if locker.is_pin_set() {
            let old_pin = old_pin.ok_or(StatusCode::PinRequired)?;
            if locker.retries() == 0 {
                return Err(StatusCode::PinBlocked);
            }
            if !locker.is_pin_match(&pin_locker::pin_hash(old_pin.as_bytes())) {
                locker.decrement_retries()?;
                return Err(StatusCode::PinInvalid);
            }
        }

        locker.set_retries(MAX_PIN_RETRIES)?;
        locker.lock_pin(pin_locker::pin_hash(new_pin.as_bytes()))
    }

    /// Every stored credential
    pub fn all_credentials(&self) -> Result<Vec<CredentialSource>> {
        self.callbacks.all_credentials()
    }

    /// Delete one credential after the user confirms
    pub fn delete_credential(&self, credential_id: &[u8]) -> Result<()> {
        let credential = self
            .callbacks
            .credential_by_id(credential_id)?
            .ok_or(StatusCode::NoCredentials)?;

        let request = ConsentRequest::new(PromptKind::DeleteCredential)
            .with_rp(credential.rp_id.clone(), credential.rp_name.clone())
            .with_user(
                credential.user_name.clone(),
                credential.user_display_name.clone(),
            );
        if !self.confirm_prompt(&request) {
            return Err(StatusCode::OperationDenied);
        }

        self.callbacks.delete_credential(credential_id)
    }

    /// Delete every credential after the user confirms
    pub fn delete_all_credentials(&self) -> Result<()> {
        if !self.confirm_prompt(&ConsentRequest::new(PromptKind::DeleteAllCredentials)) {
            return Err(StatusCode::OperationDenied);
        }
        self.callbacks.delete_all_credentials()
    }
}

impl<C: AuthenticatorCallbacks> core::fmt::Debug for Authenticator<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .field("status", &self.internal_status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CredentialSafe;
    use crate::memory::MemoryCredentialSafe;
    use crate::scripted::{Answer, ScriptedInteraction, TestCallbacks};
    use crate::types::NewCredential;

    use authorizer_crypto::ecdh::KeyPair;

    fn authenticator(answer: Answer) -> Authenticator<TestCallbacks> {
        let callbacks = TestCallbacks::new(
            ScriptedInteraction::new(answer),
            MemoryCredentialSafe::new(),
        );
        Authenticator::new(AuthenticatorConfig::new(), callbacks).unwrap()
    }

    fn pin_hash_enc(auth: &Authenticator<TestCallbacks>, platform: &KeyPair, pin: &str) -> Vec<u8> {
        let (x, y) = auth.key_agreement_public();
        let shared = platform.shared_secret_cose(&x, &y).unwrap();
        v1::encrypt(&shared, &pin_locker::pin_hash(pin.as_bytes())).unwrap()
    }

    fn platform_secret(auth: &Authenticator<TestCallbacks>, platform: &KeyPair) -> [u8; 32] {
        let (x, y) = platform.public_key_cose();
        auth.shared_secret(&x, &y).unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = AuthenticatorConfig::new()
            .with_aaguid([7; 16])
            .with_wink(true)
            .with_user_presence_timeout(Duration::from_secs(5));

        assert_eq!(config.aaguid, [7; 16]);
        assert!(config.wink);
        assert_eq!(config.max_msg_size, 4096);
        assert_eq!(config.user_presence_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_initial_state() {
        let auth = authenticator(Answer::Accept);
        assert_eq!(auth.internal_status(), InternalStatus::Idle);
        assert!(!auth.is_pin_set());
        assert_eq!(auth.pin_retries(), MAX_PIN_RETRIES);
    }

    #[test]
    fn test_set_pin_locally() {
        let auth = authenticator(Answer::Accept);
        assert_eq!(
            auth.set_pin_locally("123", None),
            Err(StatusCode::PinPolicyViolation)
        );

        auth.set_pin_locally("1234", None).unwrap();
        assert!(auth.is_pin_set());

        assert_eq!(
            auth.set_pin_locally("5678", None),
            Err(StatusCode::PinRequired)
        );
        assert_eq!(
            auth.set_pin_locally("5678", Some("0000")),
            Err(StatusCode::PinInvalid)
        );
        assert_eq!(auth.pin_retries(), MAX_PIN_RETRIES - 1);

        auth.set_pin_locally("5678", Some("1234")).unwrap();
        assert_eq!(auth.pin_retries(), MAX_PIN_RETRIES);
        assert!(auth.pin().is_pin_match(&pin_locker::pin_hash(b"5678")));
    }

    #[test]
    fn test_set_pin_locally_denied() {
        let auth = authenticator(Answer::Deny);
        assert_eq!(
            auth.set_pin_locally("1234", None),
            Err(StatusCode::OperationDenied)
        );
        assert!(!auth.is_pin_set());
    }

    #[test]
    fn test_three_mismatches_block_pin_auth() {
        let auth = authenticator(Answer::Accept);
        auth.set_pin_locally("1234", None).unwrap();

        let platform = KeyPair::generate();
        for expected in [
            StatusCode::PinInvalid,
            StatusCode::PinInvalid,
            StatusCode::PinAuthBlocked,
        ] {
            let key_before = auth.key_agreement_public();
            let enc = pin_hash_enc(&auth, &platform, "0000");
            let shared = platform_secret(&auth, &platform);

            assert_eq!(auth.verify_pin_hash_enc(&shared, &enc), Err(expected));
            assert_ne!(auth.key_agreement_public(), key_before);
        }

        assert!(auth.is_pin_auth_blocked());
        assert_eq!(auth.pin_retries(), MAX_PIN_RETRIES - 3);
        assert!(
            auth.callbacks()
                .interaction()
                .shown()
                .contains(&PromptKind::PinAuthBlocked)
        );
    }

    #[test]
    fn test_success_clears_mismatches() {
        let auth = authenticator(Answer::Accept);
        auth.set_pin_locally("1234", None).unwrap();
        let platform = KeyPair::generate();

        for _ in 0..2 {
            let enc = pin_hash_enc(&auth, &platform, "0000");
            let shared = platform_secret(&auth, &platform);
            assert_eq!(
                auth.verify_pin_hash_enc(&shared, &enc),
                Err(StatusCode::PinInvalid)
            );
        }

        let enc = pin_hash_enc(&auth, &platform, "1234");
        let shared = platform_secret(&auth, &platform);
        auth.verify_pin_hash_enc(&shared, &enc).unwrap();
        assert_eq!(auth.session().mismatches(), 0);
        assert_eq!(auth.pin_retries(), MAX_PIN_RETRIES);

        let enc = pin_hash_enc(&auth, &platform, "0000");
        let shared = platform_secret(&auth, &platform);
        assert_eq!(
            auth.verify_pin_hash_enc(&shared, &enc),
            Err(StatusCode::PinInvalid)
        );
    }

    #[test]
    fn test_last_retry_blocks_pin() {
        let auth = authenticator(Answer::Accept);
        auth.set_pin_locally("1234", None).unwrap();
        auth.pin().set_retries(1).unwrap();

        let platform = KeyPair::generate();
        let enc = pin_hash_enc(&auth, &platform, "0000");
        let shared = platform_secret(&auth, &platform);
        assert_eq!(
            auth.verify_pin_hash_enc(&shared, &enc),
            Err(StatusCode::PinBlocked)
        );
        assert_eq!(auth.pin_retries(), 0);
    }

    #[test]
    fn test_verify_pin_auth() {
        let auth = authenticator(Answer::Accept);
        let cdh = [0x42u8; 32];

        // No PIN, no pinAuth: verified
        assert_eq!(auth.verify_pin_auth(None, &cdh, true), Ok(true));
        assert_eq!(
            auth.verify_pin_auth(Some(&[]), &cdh, false),
            Err(StatusCode::PinNotSet)
        );

        auth.set_pin_locally("1234", None).unwrap();
        assert_eq!(auth.verify_pin_auth(None, &cdh, false), Ok(false));
        assert_eq!(
            auth.verify_pin_auth(None, &cdh, true),
            Err(StatusCode::PinRequired)
        );
        assert_eq!(
            auth.verify_pin_auth(Some(&[]), &cdh, false),
            Err(StatusCode::PinInvalid)
        );

        let token = *auth.pin().token();
        let pin_auth = v1::authenticate(&token, &cdh);
        assert_eq!(auth.verify_pin_auth(Some(&pin_auth), &cdh, true), Ok(true));

        assert_eq!(
            auth.verify_pin_auth(Some(&[0u8; 16]), &cdh, true),
            Err(StatusCode::PinAuthInvalid)
        );
    }

    #[test]
    fn test_reset() {
        let auth = authenticator(Answer::Accept);
        auth.set_pin_locally("1234", None).unwrap();
        auth.callbacks()
            .generate_credential(NewCredential {
                rp_id: "example.com".to_string(),
                user_handle: vec![1],
                ..Default::default()
            })
            .unwrap();

        auth.reset().unwrap();

        assert!(!auth.is_pin_set());
        assert!(auth.all_credentials().unwrap().is_empty());
    }

    #[test]
    fn test_reset_denied() {
        let auth = authenticator(Answer::Deny);
        assert_eq!(auth.reset(), Err(StatusCode::OperationDenied));
    }

    #[test]
    fn test_delete_credential() {
        let auth = authenticator(Answer::Accept);
        let cred = auth
            .callbacks()
            .generate_credential(NewCredential {
                rp_id: "example.com".to_string(),
                user_handle: vec![1],
                ..Default::default()
            })
            .unwrap();

        auth.delete_credential(&cred.id).unwrap();
        assert_eq!(
            auth.delete_credential(&cred.id),
            Err(StatusCode::NoCredentials)
        );
    }

    #[test]
    fn test_unanswered_prompt_times_out() {
        let callbacks = TestCallbacks::new(
            ScriptedInteraction::new(Answer::Withhold),
            MemoryCredentialSafe::new(),
        );
        let config =
            AuthenticatorConfig::new().with_user_presence_timeout(Duration::from_millis(20));
        let auth = Authenticator::new(config, callbacks).unwrap();

        assert_eq!(auth.reset(), Err(StatusCode::OperationDenied));
        assert_eq!(auth.internal_status(), InternalStatus::Processing);
    }

    #[test]
    fn test_cancel_before_prompt() {
        let callbacks = TestCallbacks::new(
            ScriptedInteraction::new(Answer::Withhold),
            MemoryCredentialSafe::new(),
        );
        let auth = Authenticator::new(AuthenticatorConfig::new(), callbacks).unwrap();

        let token = CancelToken::new();
        auth.begin_command(token.clone());
        auth.cancel_command(&token);
        // Would wait for a minute if the cancel were lost
        assert_eq!(auth.reset(), Err(StatusCode::OperationDenied));
    }

    #[test]
    fn test_stale_token_leaves_current_command_alone() {
        let auth = authenticator(Answer::Accept);
        let stale = CancelToken::new();
        auth.begin_command(stale.clone());
        auth.end_command();

        auth.begin_command(CancelToken::new());
        auth.cancel_command(&stale);
        assert_eq!(auth.reset(), Ok(()));
    }

    #[test]
    fn test_cancelled_token_shows_no_prompt() {
        let interaction = ScriptedInteraction::new(Answer::Accept);
        let callbacks = TestCallbacks::new(interaction.clone(), MemoryCredentialSafe::new());
        let auth = Authenticator::new(AuthenticatorConfig::new(), callbacks).unwrap();

        let token = CancelToken::new();
        token.cancel();
        auth.begin_command(token);
        assert_eq!(auth.reset(), Err(StatusCode::OperationDenied));
        assert!(interaction.shown().is_empty());

        // The next command starts with a fresh token
        auth.begin_command(CancelToken::new());
        assert_eq!(auth.reset(), Ok(()));
        assert_eq!(interaction.shown().len(), 1);
    }
}
