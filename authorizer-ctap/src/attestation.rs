//! Attestation statements
//!
//! Only self attestation (packed format signed by the credential key) and
//! "none" are produced.
//!
//! Spec: <https://www.w3.org/TR/webauthn-2/#sctn-defined-attestation-formats>

use crate::cbor::{MapBuilder, Value};
use crate::status::Result;

use authorizer_crypto::ecdsa;

use tracing::warn;

/// makeCredential response keys
mod resp_keys {
    pub const FMT: i32 = 0x01;
    pub const AUTH_DATA: i32 = 0x02;
    pub const ATT_STMT: i32 = 0x03;
}

/// Attestation statement of a new credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attestation {
    None,
    /// Packed format without x5c; `sig` is a DER ES256 signature
    PackedSelf { sig: Vec<u8> },
}

impl Attestation {
    /// Self attestation over `authData || clientDataHash`
    ///
    /// Falls back to [`Attestation::None`] when signing fails.
    pub fn self_signed(private_key: &[u8; 32], auth_data: &[u8], client_data_hash: &[u8]) -> Self {
        let mut message = Vec::with_capacity(auth_data.len() + client_data_hash.len());
        message.extend_from_slice(auth_data);
        message.extend_from_slice(client_data_hash);

        match ecdsa::sign(private_key, &message) {
            Ok(sig) => Self::PackedSelf { sig },
            Err(err) => {
                warn!(%err, "Self attestation failed, using none");
                Self::None
            }
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PackedSelf { .. } => "packed",
        }
    }

    fn statement(&self) -> Value {
        match self {
            Self::None => Value::Map(Vec::new()),
            Self::PackedSelf { sig } => Value::Map(vec![
                (
                    Value::Text("alg".to_string()),
                    Value::Integer(ecdsa::COSE_ALG_ES256.into()),
                ),
                (Value::Text("sig".to_string()), Value::Bytes(sig.clone())),
            ]),
        }
    }

    /// makeCredential response body: { 1: fmt, 2: authData, 3: attStmt }
    pub fn encode(&self, auth_data: &[u8]) -> Result<Vec<u8>> {
        MapBuilder::new()
            .insert(resp_keys::FMT, self.format())?
            .insert_bytes(resp_keys::AUTH_DATA, auth_data)?
            .insert(resp_keys::ATT_STMT, self.statement())?
            .build()
    }
}
