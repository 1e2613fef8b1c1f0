//! authenticatorData construction
//!
//! Format: rpIdHash (32) || flags (1) || signCount (4, BE) || attestedCredData || extensions
//!
//! Spec: <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>

use crate::cbor::MapBuilder;
use crate::status::{Result, StatusCode};
use crate::types::CredentialSource;

use authorizer_crypto::{coordinates, ecdsa, sha256};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// authenticatorData flag bits
pub mod flags {
    /// User present
    pub const UP: u8 = 0x01;
    /// User verified
    pub const UV: u8 = 0x04;
    /// Attested credential data included
    pub const AT: u8 = 0x40;
    /// Extension data included
    pub const ED: u8 = 0x80;
}

/// Length of rpIdHash, flags and counter
pub const HEADER_LENGTH: usize = 37;

/// COSE EC2 key type
const COSE_KTY_EC2: i32 = 2;

/// COSE P-256 curve
const COSE_CRV_P256: i32 = 1;

/// COSE algorithm of the ClientPIN key agreement key (ECDH-ES + HKDF-256)
pub const COSE_ALG_ECDH_ES_HKDF_256: i32 = -25;

/// Credential data attached during makeCredential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE encoded credential public key
    pub public_key: Vec<u8>,
}

impl AttestedCredentialData {
    /// aaguid (16) || credentialIdLength (2, BE) || credentialId || publicKey
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let id_len = u16::try_from(self.credential_id.len()).map_err(|_| StatusCode::Other)?;

        let mut out = Vec::with_capacity(18 + self.credential_id.len() + self.public_key.len());
        out.extend_from_slice(&self.aaguid);
        out.extend_from_slice(&id_len.to_be_bytes());
        out.extend_from_slice(&self.credential_id);
        out.extend_from_slice(&self.public_key);
        Ok(out)
    }
}

/// Authenticator data under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub user_verified: bool,
    pub sign_count: u32,
    pub attested: Option<AttestedCredentialData>,
    /// Encoded extension output map
    pub extensions: Vec<u8>,
}

impl AuthenticatorData {
    pub fn new(rp_id_hash: [u8; 32], sign_count: u32) -> Self {
        Self {
            rp_id_hash,
            user_verified: false,
            sign_count,
            attested: None,
            extensions: Vec::new(),
        }
    }

    pub fn with_user_verified(mut self, uv: bool) -> Self {
        self.user_verified = uv;
        self
    }

    pub fn with_attested(mut self, attested: AttestedCredentialData) -> Self {
        self.attested = Some(attested);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<u8>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Whether the extension map carries anything beyond an empty map header
    fn has_extensions(&self) -> bool {
        self.extensions.len() > 1
    }

    /// Flag byte; user presence is always asserted
    pub fn flags(&self) -> u8 {
        let mut value = flags::UP;
        if self.user_verified {
            value |= flags::UV;
        }
        if self.attested.is_some() {
            value |= flags::AT;
        }
        if self.has_extensions() {
            value |= flags::ED;
        }
        value
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_LENGTH);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags());
        out.extend_from_slice(&self.sign_count.to_be_bytes());

        if let Some(attested) = &self.attested {
            out.extend_from_slice(&attested.to_bytes()?);
        }
        if self.has_extensions() {
            out.extend_from_slice(&self.extensions);
        }

        Ok(out)
    }
}

/// Build a COSE EC2 public key from uncompressed SEC1
///
/// { 1: 2, 3: alg, -1: 1, -2: x, -3: y }
pub fn cose_public_key(public_key: &[u8], algorithm: i32) -> Result<Vec<u8>> {
    let (x, y) = coordinates::split_public_key(public_key)?;
    cose_key_builder(&x, &y, algorithm)?.build()
}

/// COSE credential public key for ES256
pub fn cose_es256_public_key(public_key: &[u8]) -> Result<Vec<u8>> {
    cose_public_key(public_key, ecdsa::COSE_ALG_ES256)
}

/// COSE key for the ClientPIN key agreement
pub fn cose_key_agreement(x: &[u8], y: &[u8]) -> Result<MapBuilder> {
    cose_key_builder(x, y, COSE_ALG_ECDH_ES_HKDF_256)
}

fn cose_key_builder(x: &[u8], y: &[u8], algorithm: i32) -> Result<MapBuilder> {
    MapBuilder::new()
        .insert(1, COSE_KTY_EC2)?
        .insert(3, algorithm)?
        .insert(-1, COSE_CRV_P256)?
        .insert_bytes(-2, x)?
        .insert_bytes(-3, y)
}

/// rpIdHash for a stored credential
///
/// U2F credentials whose application id could not be resolved carry the
/// base64 of the application hash as both ids; that is decoded rather than
/// hashed again. A resolved U2F credential is bound to its legacy application
/// id, so that is what gets hashed. An empty application id counts as none.
pub fn credential_rp_id_hash(credential: &CredentialSource) -> Result<[u8; 32]> {
    match credential.u2f_rp_id.as_deref().filter(|id| !id.is_empty()) {
        Some(u2f_rp_id) if u2f_rp_id == credential.rp_id => {
            let decoded = STANDARD
                .decode(u2f_rp_id)
                .map_err(|_| StatusCode::Other)?;
            decoded.try_into().map_err(|_| StatusCode::Other)
        }
        Some(u2f_rp_id) => Ok(sha256(u2f_rp_id.as_bytes())),
        None => Ok(sha256(credential.rp_id.as_bytes())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::{self, Value};
    use crate::types::NewCredential;

    #[test]
    fn test_assertion_layout() {
        let data = AuthenticatorData::new(sha256(b"example.com"), 0x0102_0304)
            .with_user_verified(true)
            .to_bytes()
            .unwrap();

        assert_eq!(data.len(), HEADER_LENGTH);
        assert_eq!(&data[..32], &sha256(b"example.com"));
        assert_eq!(data[32], flags::UP | flags::UV);
        assert_eq!(&data[33..37], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_attested_layout() {
        let (_, public_key) = ecdsa::generate_keypair();
        let cose = cose_es256_public_key(&public_key).unwrap();
        let attested = AttestedCredentialData {
            aaguid: [0xAA; 16],
            credential_id: vec![7; 32],
            public_key: cose.clone(),
        };

        let data = AuthenticatorData::new([0; 32], 0)
            .with_attested(attested)
            .to_bytes()
            .unwrap();

        assert_eq!(data[32], flags::UP | flags::AT);
        assert_eq!(&data[37..53], &[0xAA; 16]);
        assert_eq!(&data[53..55], &[0, 32]);
        assert_eq!(&data[55..87], &[7; 32]);
        assert_eq!(&data[87..], &cose[..]);
    }

    #[test]
    fn test_extension_flag_needs_more_than_empty_map() {
        let empty = AuthenticatorData::new([0; 32], 0).with_extensions(vec![0xa0]);
        assert_eq!(empty.flags() & flags::ED, 0);
        assert_eq!(empty.to_bytes().unwrap().len(), HEADER_LENGTH);

        let ext = vec![0xa1, 0x61, 0x78, 0xf5];
        let data = AuthenticatorData::new([0; 32], 0).with_extensions(ext.clone());
        assert_eq!(data.flags() & flags::ED, flags::ED);
        assert_eq!(&data.to_bytes().unwrap()[HEADER_LENGTH..], &ext[..]);
    }

    #[test]
    fn test_cose_public_key() {
        let (_, public_key) = ecdsa::generate_keypair();
        let cose = cose_es256_public_key(&public_key).unwrap();

        let value: Value = cbor::decode(&cose).unwrap();
        let map = cbor::as_map(&value).unwrap();
        assert_eq!(cbor::map_get_int(map, 1), Some(&Value::Integer(2)));
        assert_eq!(cbor::map_get_int(map, 3), Some(&Value::Integer(-7)));
        assert_eq!(
            cbor::map_get_int(map, -2),
            Some(&Value::Bytes(public_key[1..33].to_vec()))
        );
        // Canonical order: 1, 3, -1, -2, -3
        assert_eq!(&cose[..3], &[0xa5, 0x01, 0x02]);
    }

    #[test]
    fn test_cose_public_key_rejects_compressed() {
        assert!(cose_es256_public_key(&[0x02; 33]).is_err());
    }

    #[test]
    fn test_credential_rp_id_hash() {
        let webauthn = CredentialSource::generate(NewCredential {
            rp_id: "example.com".to_string(),
            ..Default::default()
        });
        assert_eq!(
            credential_rp_id_hash(&webauthn).unwrap(),
            sha256(b"example.com")
        );

        let resolved = CredentialSource::generate(NewCredential {
            rp_id: "github.com".to_string(),
            u2f_rp_id: Some("https://github.com/u2f/trusted_facets".to_string()),
            ..Default::default()
        });
        assert_eq!(
            credential_rp_id_hash(&resolved).unwrap(),
            sha256(b"https://github.com/u2f/trusted_facets")
        );

        let app = [0x5Au8; 32];
        let encoded = STANDARD.encode(app);
        let unresolved = CredentialSource::generate(NewCredential {
            rp_id: encoded.clone(),
            u2f_rp_id: Some(encoded),
            ..Default::default()
        });
        assert_eq!(credential_rp_id_hash(&unresolved).unwrap(), app);
    }

    #[test]
    fn test_empty_u2f_rp_id_is_ignored() {
        let credential = CredentialSource::generate(NewCredential {
            rp_id: "example.com".to_string(),
            u2f_rp_id: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(
            credential_rp_id_hash(&credential).unwrap(),
            sha256(b"example.com")
        );

        // Even when the rp id is empty too
        let credential = CredentialSource::generate(NewCredential {
            u2f_rp_id: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(credential_rp_id_hash(&credential).unwrap(), sha256(b""));
    }
}
