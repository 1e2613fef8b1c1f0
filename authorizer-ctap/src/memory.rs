//! In-memory credential safe
//!
//! Credentials are kept in insertion order and forgotten when the last clone
//! of the safe is dropped. Suitable for tests and demos.

use crate::callbacks::CredentialSafe;
use crate::status::{Result, StatusCode};
use crate::types::{CredentialSource, NewCredential};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Credential safe backed by a shared vector
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialSafe {
    credentials: Arc<Mutex<Vec<CredentialSource>>>,
    capacity: Option<usize>,
}

impl MemoryCredentialSafe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A safe that refuses to hold more than `capacity` credentials
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            credentials: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Number of stored credentials
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Store an existing credential
    pub fn insert(&self, credential: CredentialSource) {
        self.lock().push(credential);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CredentialSource>> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialSafe for MemoryCredentialSafe {
    fn generate_credential(&self, request: NewCredential) -> Result<CredentialSource> {
        let mut credentials = self.lock();
        if self.capacity.is_some_and(|cap| credentials.len() >= cap) {
            return Err(StatusCode::KeyStoreFull);
        }

        let credential = CredentialSource::generate(request);
        credentials.push(credential.clone());
        Ok(credential)
    }

    fn credential_by_id(&self, id: &[u8]) -> Result<Option<CredentialSource>> {
        Ok(self.lock().iter().find(|c| c.id == id).cloned())
    }

    fn credentials_for_rp(&self, rp_id: &str) -> Result<Vec<CredentialSource>> {
        Ok(self
            .lock()
            .iter()
            .filter(|c| c.rp_id == rp_id)
            .cloned()
            .collect())
    }

    fn all_credentials(&self) -> Result<Vec<CredentialSource>> {
        Ok(self.lock().clone())
    }

    fn delete_credential(&self, id: &[u8]) -> Result<()> {
        self.lock().retain(|c| c.id != id);
        Ok(())
    }

    fn delete_all_credentials(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn increment_counter(&self, id: &[u8]) -> Result<u32> {
        let mut credentials = self.lock();
        let credential = credentials
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StatusCode::NoCredentials)?;
        credential.use_counter = credential.use_counter.wrapping_add(1);
        Ok(credential.use_counter)
    }
}
