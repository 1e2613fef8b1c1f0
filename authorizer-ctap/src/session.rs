//! Power-cycle scoped authenticator state
//!
//! Nothing here is persisted: the key agreement pair, the consecutive PIN
//! mismatch counter and the credential remembered by a preflight assertion
//! all start over with a new session.

use authorizer_crypto::ecdh::KeyPair;

/// Consecutive mismatches after which PIN auth is blocked until power cycle
pub const MAX_CONSECUTIVE_MISMATCHES: u8 = 3;

/// Volatile state shared by the PIN and assertion paths
#[derive(Debug)]
pub struct Session {
    key_agreement: KeyPair,
    mismatches: u8,
    preflight: Option<Vec<u8>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            key_agreement: KeyPair::generate(),
            mismatches: 0,
            preflight: None,
        }
    }

    /// The authenticator-wide key agreement pair
    pub fn key_agreement(&self) -> &KeyPair {
        &self.key_agreement
    }

    pub fn regenerate_key_agreement(&mut self) {
        self.key_agreement = KeyPair::generate();
    }

    pub fn mismatches(&self) -> u8 {
        self.mismatches
    }

    /// Count a PIN mismatch, returning the new consecutive count
    pub fn record_mismatch(&mut self) -> u8 {
        self.mismatches = self.mismatches.saturating_add(1);
        self.mismatches
    }

    pub fn clear_mismatches(&mut self) {
        self.mismatches = 0;
    }

    /// Whether PIN auth stays blocked until the next power cycle
    pub fn is_pin_auth_blocked(&self) -> bool {
        self.mismatches >= MAX_CONSECUTIVE_MISMATCHES
    }

    /// Remember the credential a preflight assertion selected
    pub fn remember_preflight(&mut self, credential_id: Vec<u8>) {
        self.preflight = Some(credential_id);
    }

    /// Consume the remembered preflight selection
    pub fn take_preflight(&mut self) -> Option<Vec<u8>> {
        self.preflight.take()
    }
}
