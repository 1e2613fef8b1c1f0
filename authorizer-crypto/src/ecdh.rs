//! P-256 ECDH for PIN protocol one and `hmac-secret` key agreement
//!
//! The shared secret is SHA-256 of the x-coordinate of the agreed point, per
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#gettingSharedSecret>

use crate::coordinates::{self, FIELD_SIZE};
use crate::error::{CryptoError, Result};
use crate::pin_protocol::sha256;

use p256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;

/// P-256 key pair for ECDH key agreement
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    ///
    /// # Examples
    ///
    /// ```
    /// use authorizer_crypto::ecdh::KeyPair;
    ///
    /// let keypair = KeyPair::generate();
    /// assert_eq!(keypair.public_key_bytes().len(), 65);
    /// ```
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Public key as (x, y), each exactly 32 bytes
    ///
    /// This is the form carried in COSE_Key structures (kty 2, alg -25, crv 1).
    pub fn public_key_cose(&self) -> ([u8; FIELD_SIZE], [u8; FIELD_SIZE]) {
        let point = self.public.to_encoded_point(false);
        let mut x = [0u8; FIELD_SIZE];
        let mut y = [0u8; FIELD_SIZE];
        // An uncompressed, non-identity point always carries both coordinates.
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        (x, y)
    }

    /// Public key in uncompressed SEC1 format (0x04 || x || y)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Compute SHA-256((abG).x) with a peer's SEC1 public key
    ///
    /// # Examples
    ///
    /// ```
    /// use authorizer_crypto::ecdh::KeyPair;
    ///
    /// let alice = KeyPair::generate();
    /// let bob = KeyPair::generate();
    ///
    /// let alice_shared = alice.shared_secret(&bob.public_key_bytes()).unwrap();
    /// let bob_shared = bob.shared_secret(&alice.public_key_bytes()).unwrap();
    /// assert_eq!(alice_shared, bob_shared);
    /// ```
    pub fn shared_secret(&self, peer_public_key: &[u8]) -> Result<[u8; 32]> {
        let peer_public = PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let shared =
            p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());

        let x = shared.raw_secret_bytes();
        if x.len() != FIELD_SIZE {
            return Err(CryptoError::KeyAgreementFailed);
        }
        Ok(sha256(x))
    }

    /// Compute the shared secret with a peer given as COSE coordinates
    pub fn shared_secret_cose(&self, x: &[u8], y: &[u8]) -> Result<[u8; 32]> {
        let sec1 = coordinates::public_key_from_coordinates(x, y)?;
        self.shared_secret(&sec1)
    }

    /// Create a key pair from an existing 32-byte scalar
    pub fn from_bytes(secret_bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_bytes(secret_bytes.into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_bytes())
            .finish_non_exhaustive()
    }
}
