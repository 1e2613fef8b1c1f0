//! CTAP data types
//!
//! Request entities (relying party, user, credential descriptors) and the
//! credential source stored by the host's credential safe.

use crate::status::{Result, StatusCode};

use authorizer_crypto::ecdsa;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credential type string used throughout WebAuthn
pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Length of credential ids generated by [`CredentialSource::generate`]
pub const CREDENTIAL_ID_LENGTH: usize = 32;

/// Relying Party information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    /// Relying party identifier (e.g., "example.com")
    pub id: String,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// User account information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User handle
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Identifies a credential in allow and exclude lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    /// Credential type (always "public-key")
    #[serde(rename = "type")]
    pub cred_type: String,

    /// Credential ID
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
}

impl PublicKeyCredentialDescriptor {
    /// Create a new public-key credential descriptor
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            cred_type: PUBLIC_KEY_TYPE.to_string(),
            id,
        }
    }
}

/// An acceptable credential type and algorithm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialParameters {
    /// Credential type
    #[serde(rename = "type")]
    pub cred_type: String,

    /// COSE algorithm identifier
    pub alg: i32,
}

impl PublicKeyCredentialParameters {
    /// ES256 algorithm (P-256 + SHA-256)
    pub fn es256() -> Self {
        Self {
            cred_type: PUBLIC_KEY_TYPE.to_string(),
            alg: ecdsa::COSE_ALG_ES256,
        }
    }
}

/// Parameters for creating a credential in the credential safe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCredential {
    pub rp_id: String,
    pub rp_name: Option<String>,
    pub user_handle: Vec<u8>,
    pub user_name: Option<String>,
    pub user_display_name: Option<String>,
    /// Legacy U2F application id, set only for U2F registrations
    pub u2f_rp_id: Option<String>,
    /// Whether to attach an `hmac-secret` key
    pub hmac_secret: bool,
}

/// A credential as stored by the credential safe
///
/// Key material is wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialSource {
    /// Credential ID
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    /// Relying party identifier
    pub rp_id: String,

    pub rp_name: Option<String>,

    /// User handle
    #[serde(with = "serde_bytes")]
    pub user_handle: Vec<u8>,

    pub user_name: Option<String>,

    pub user_display_name: Option<String>,

    /// ES256 private scalar
    pub private_key: [u8; 32],

    /// Symmetric key for the `hmac-secret` extension
    pub hmac_secret: Option<[u8; 32]>,

    /// Legacy U2F application id
    ///
    /// Equal to `rp_id` when the application hash could not be resolved to a
    /// domain, in which case both hold the base64 of the hash.
    pub u2f_rp_id: Option<String>,

    /// Signature counter
    pub use_counter: u32,
}

impl CredentialSource {
    /// Generate a fresh key pair and random credential id
    pub fn generate(request: NewCredential) -> Self {
        let (private_key, _) = ecdsa::generate_keypair();

        let mut id = vec![0u8; CREDENTIAL_ID_LENGTH];
        OsRng.fill_bytes(&mut id);

        let hmac_secret = request.hmac_secret.then(|| {
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            key
        });

        Self {
            id,
            rp_id: request.rp_id,
            rp_name: request.rp_name,
            user_handle: request.user_handle,
            user_name: request.user_name,
            user_display_name: request.user_display_name,
            private_key: *private_key,
            hmac_secret,
            u2f_rp_id: request.u2f_rp_id,
            use_counter: 0,
        }
    }

    /// Uncompressed SEC1 public key
    pub fn public_key(&self) -> Result<Vec<u8>> {
        ecdsa::public_from_private(&self.private_key).map_err(|_| StatusCode::Other)
    }

    /// Descriptor naming this credential
    pub fn descriptor(&self) -> PublicKeyCredentialDescriptor {
        PublicKeyCredentialDescriptor::new(self.id.clone())
    }
}

impl core::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialSource")
            .field("id", &self.id)
            .field("rp_id", &self.rp_id)
            .field("user_name", &self.user_name)
            .field("u2f_rp_id", &self.u2f_rp_id)
            .field("use_counter", &self.use_counter)
            .finish_non_exhaustive()
    }
}
