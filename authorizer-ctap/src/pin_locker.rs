//! Client PIN state
//!
//! The locker owns the persisted PIN hash and retry counter, plus the PIN
//! token. The token lives only in memory and is regenerated whenever the
//! locker is created (a power cycle) and whenever a new PIN is stored.

use crate::status::{Result, StatusCode};

use std::sync::{Mutex, PoisonError};

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Maximum PIN retry attempts before blocking
pub const MAX_PIN_RETRIES: u8 = 8;

/// Minimum PIN length in characters
pub const MIN_PIN_LENGTH: usize = 4;

/// Length of the stored PIN hash: LEFT(SHA-256(pin), 16)
pub const PIN_HASH_LENGTH: usize = 16;

/// Length of the PIN token
pub const PIN_TOKEN_LENGTH: usize = 32;

/// Persisted PIN state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    /// LEFT(SHA-256(pin), 16), `None` if no PIN is set
    pub pin_hash: Option<[u8; PIN_HASH_LENGTH]>,

    /// Remaining PIN retry attempts (0-8)
    pub retries: u8,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            pin_hash: None,
            retries: MAX_PIN_RETRIES,
        }
    }
}

/// Persistence for [`PinState`]
pub trait PinStore: Send {
    fn load(&self) -> Result<PinState>;

    fn save(&self, state: &PinState) -> Result<()>;
}

/// PIN store that forgets everything when dropped
#[derive(Debug, Default)]
pub struct MemoryPinStore {
    state: Mutex<PinState>,
}

impl MemoryPinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state
    pub fn with_state(state: PinState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl PinStore for MemoryPinStore {
    fn load(&self) -> Result<PinState> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, state: &PinState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}

/// Truncated SHA-256 of a PIN as stored in the locker
pub fn pin_hash(pin: &[u8]) -> [u8; PIN_HASH_LENGTH] {
    let digest = authorizer_crypto::sha256(pin);
    let mut out = [0u8; PIN_HASH_LENGTH];
    out.copy_from_slice(&digest[..PIN_HASH_LENGTH]);
    out
}

/// PIN hash, retry counter and PIN token
pub struct PinLocker {
    store: Box<dyn PinStore>,
    state: PinState,
    token: Zeroizing<[u8; PIN_TOKEN_LENGTH]>,
}

impl PinLocker {
    /// Load the persisted state and generate a fresh token
    pub fn new(store: Box<dyn PinStore>) -> Result<Self> {
        let mut state = store.load()?;
        state.retries = state.retries.min(MAX_PIN_RETRIES);

        let mut locker = Self {
            store,
            state,
            token: Zeroizing::new([0u8; PIN_TOKEN_LENGTH]),
        };
        locker.refresh_token();
        Ok(locker)
    }

    pub fn is_pin_set(&self) -> bool {
        self.state.pin_hash.is_some()
    }

    pub fn retries(&self) -> u8 {
        self.state.retries
    }

    /// Set the retry counter; values above the maximum are ignored
    pub fn set_retries(&mut self, retries: u8) -> Result<()> {
        if retries > MAX_PIN_RETRIES {
            return Ok(());
        }
        self.state.retries = retries;
        self.store.save(&self.state)
    }

    /// Decrement the retry counter
    ///
    /// Fails `PinBlocked` without touching the counter when it is already zero.
    pub fn decrement_retries(&mut self) -> Result<u8> {
        if self.state.retries == 0 {
            return Err(StatusCode::PinBlocked);
        }
        self.state.retries -= 1;
        self.store.save(&self.state)?;
        Ok(self.state.retries)
    }

    pub fn token(&self) -> &[u8; PIN_TOKEN_LENGTH] {
        &self.token
    }

    pub fn refresh_token(&mut self) {
        OsRng.fill_bytes(&mut self.token[..]);
    }

    /// Store a new PIN hash and invalidate the current token
    pub fn lock_pin(&mut self, hash: [u8; PIN_HASH_LENGTH]) -> Result<()> {
        self.refresh_token();
        self.state.pin_hash = Some(hash);
        self.store.save(&self.state)
    }

    /// Constant-time comparison with the stored hash; false when no PIN is set
    pub fn is_pin_match(&self, hash: &[u8]) -> bool {
        match &self.state.pin_hash {
            Some(stored) => stored[..].ct_eq(hash).into(),
            None => false,
        }
    }

    /// Forget the PIN and restore the retry counter
    pub fn reset(&mut self) -> Result<()> {
        self.state = PinState::default();
        self.refresh_token();
        self.store.save(&self.state)
    }
}

impl core::fmt::Debug for PinLocker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PinLocker")
            .field("pin_set", &self.is_pin_set())
            .field("retries", &self.state.retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locker() -> PinLocker {
        PinLocker::new(Box::new(MemoryPinStore::new())).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let locker = locker();
        assert!(!locker.is_pin_set());
        assert_eq!(locker.retries(), MAX_PIN_RETRIES);
        assert!(!locker.is_pin_match(&pin_hash(b"1234")));
    }

    #[test]
    fn test_lock_pin_and_match() {
        let mut locker = locker();
        let token_before = *locker.token();

        locker.lock_pin(pin_hash(b"1234")).unwrap();

        assert!(locker.is_pin_set());
        assert!(locker.is_pin_match(&pin_hash(b"1234")));
        assert!(!locker.is_pin_match(&pin_hash(b"4321")));
        assert_ne!(*locker.token(), token_before);
    }

    #[test]
    fn test_decrement_stops_at_zero() {
        let mut locker = locker();
        locker.set_retries(1).unwrap();

        assert_eq!(locker.decrement_retries().unwrap(), 0);
        assert_eq!(locker.decrement_retries(), Err(StatusCode::PinBlocked));
        assert_eq!(locker.retries(), 0);
    }

    #[test]
    fn test_set_retries_ignores_out_of_range() {
        let mut locker = locker();
        locker.set_retries(3).unwrap();
        locker.set_retries(9).unwrap();
        assert_eq!(locker.retries(), 3);
    }

    #[test]
    fn test_reset() {
        let mut locker = locker();
        locker.lock_pin(pin_hash(b"1234")).unwrap();
        locker.set_retries(2).unwrap();

        locker.reset().unwrap();

        assert!(!locker.is_pin_set());
        assert_eq!(locker.retries(), MAX_PIN_RETRIES);
    }

    #[test]
    fn test_state_persists_across_power_cycle() {
        let store = MemoryPinStore::with_state(PinState {
            pin_hash: Some(pin_hash(b"123456")),
            retries: 5,
        });
        let locker = PinLocker::new(Box::new(store)).unwrap();

        assert!(locker.is_pin_match(&pin_hash(b"123456")));
        assert_eq!(locker.retries(), 5);
    }

    #[test]
    fn test_pin_hash_is_truncated_sha256() {
        assert_eq!(
            hex::encode(pin_hash(b"1234")),
            "03ac674216f3e15c761ee1a5e255f067"
        );
    }
}
