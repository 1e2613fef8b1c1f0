//! P-256 ECDSA (ES256) signatures for attestation, assertions and U2F
//!
//! COSE algorithm identifier: -7 (ES256). Signatures are DER encoded as both
//! WebAuthn packed attestation and the U2F raw message format require.

use crate::error::{CryptoError, Result};

use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer, signature::Verifier};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// COSE identifier of ES256
pub const COSE_ALG_ES256: i32 = -7;

/// Generate a new random ES256 key pair
///
/// Returns (private_key, public_key) where the private key is the 32-byte
/// scalar and the public key is the 65-byte uncompressed SEC1 point.
///
/// # Examples
///
/// ```
/// use authorizer_crypto::ecdsa;
///
/// let (private_key, public_key) = ecdsa::generate_keypair();
/// assert_eq!(private_key.len(), 32);
/// assert_eq!(public_key.len(), 65);
/// assert_eq!(public_key[0], 0x04);
/// ```
pub fn generate_keypair() -> (Zeroizing<[u8; 32]>, Vec<u8>) {
    let signing_key = SigningKey::random(&mut OsRng);
    let public_key = signing_key
        .verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();

    (Zeroizing::new(signing_key.to_bytes().into()), public_key)
}

/// Sign data with ES256 and return the DER-encoded signature
///
/// # Examples
///
/// ```
/// use authorizer_crypto::ecdsa;
///
/// let (private_key, public_key) = ecdsa::generate_keypair();
/// let signature = ecdsa::sign(&private_key, b"authData || clientDataHash").unwrap();
/// assert!(ecdsa::verify(&public_key, b"authData || clientDataHash", &signature).is_ok());
/// ```
pub fn sign(private_key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    PreparedSigner::new(private_key)?.sign(data)
}

/// Verify a DER-encoded ES256 signature against a SEC1 public key
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Derive the uncompressed SEC1 public key from a private scalar
pub fn public_from_private(private_key: &[u8; 32]) -> Result<Vec<u8>> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
    Ok(signing_key
        .verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec())
}

/// A signing key loaded ahead of a user-presence prompt
///
/// The key is parsed and validated before the prompt is shown, so once the
/// user confirms, signing cannot fail on key material and no second prompt is
/// needed.
#[derive(Clone)]
pub struct PreparedSigner {
    key: SigningKey,
}

impl PreparedSigner {
    /// Load a private scalar
    pub fn new(private_key: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_bytes(private_key.into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { key })
    }

    /// Sign data and return the DER-encoded signature
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .key
            .try_sign(data)
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(signature.to_der().to_bytes().to_vec())
    }

    /// Uncompressed SEC1 public key
    pub fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

impl core::fmt::Debug for PreparedSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreparedSigner").finish_non_exhaustive()
    }
}
