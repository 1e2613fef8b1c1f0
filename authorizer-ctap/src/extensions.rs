//! CTAP extension processing
//!
//! | Extension | makeCredential | getAssertion |
//! |-----------|----------------|--------------|
//! | hmac-secret | `true` in, `true` out | encrypted HMAC of one or two salts |
//! | txAuthSimple | unsupported | text echoed and shown to the user |
//!
//! Inputs are validated when the request is parsed, so a malformed input fails
//! the whole command. Processing happens later; an extension that fails to
//! process is left out of the output instead.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#sctn-defined-extensions>

use crate::cbor::{self, Value};
use crate::status::{Result, StatusCode};
use crate::types::CredentialSource;

use authorizer_crypto::{ecdh::KeyPair, hmac_sha256, pin_protocol::v1};

use tracing::debug;

/// Extension identifiers
pub mod ext_ids {
    pub const HMAC_SECRET: &str = "hmac-secret";
    pub const TX_AUTH_SIMPLE: &str = "txAuthSimple";
}

/// Extensions reported by authenticatorGetInfo
pub const SUPPORTED: [&str; 2] = [ext_ids::HMAC_SECRET, ext_ids::TX_AUTH_SIMPLE];

/// hmac-secret input map keys
mod hmac_keys {
    pub const KEY_AGREEMENT: i64 = 0x01;
    pub const SALT_ENC: i64 = 0x02;
    pub const SALT_AUTH: i64 = 0x03;
}

/// The command an extension map belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionContext {
    MakeCredential,
    GetAssertion,
}

/// hmac-secret input during getAssertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacSecretInput {
    /// Platform key agreement coordinates
    pub x: Vec<u8>,
    pub y: Vec<u8>,
    pub salt_enc: Vec<u8>,
    pub salt_auth: Vec<u8>,
}

/// One parsed extension input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionInput {
    /// hmac-secret during makeCredential
    HmacSecretCreate,
    /// hmac-secret during getAssertion
    HmacSecretGet(HmacSecretInput),
    TxAuthSimple(String),
}

impl ExtensionInput {
    fn name(&self) -> &'static str {
        match self {
            Self::HmacSecretCreate | Self::HmacSecretGet(_) => ext_ids::HMAC_SECRET,
            Self::TxAuthSimple(_) => ext_ids::TX_AUTH_SIMPLE,
        }
    }
}

/// Parsed extension inputs of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    inputs: Vec<ExtensionInput>,
}

impl Extensions {
    /// Parse the extensions map of a request; unknown identifiers are skipped
    pub fn parse(value: Option<&Value>, context: ExtensionContext) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Self::default());
        };

        let mut inputs = Vec::new();
        for (key, input) in cbor::as_map(value)? {
            let Value::Text(name) = key else {
                continue;
            };

            match (name.as_str(), context) {
                (ext_ids::HMAC_SECRET, ExtensionContext::MakeCredential) => {
                    if !matches!(input, Value::Bool(true)) {
                        return Err(StatusCode::InvalidParameter);
                    }
                    inputs.push(ExtensionInput::HmacSecretCreate);
                }
                (ext_ids::HMAC_SECRET, ExtensionContext::GetAssertion) => {
                    inputs.push(ExtensionInput::HmacSecretGet(parse_hmac_secret(input)?));
                }
                (ext_ids::TX_AUTH_SIMPLE, ExtensionContext::MakeCredential) => {
                    return Err(StatusCode::UnsupportedExtension);
                }
                (ext_ids::TX_AUTH_SIMPLE, ExtensionContext::GetAssertion) => {
                    inputs.push(ExtensionInput::TxAuthSimple(
                        cbor::as_text(input)?.to_string(),
                    ));
                }
                (other, _) => debug!(extension = other, "Ignoring unsupported extension"),
            }
        }

        Ok(Self { inputs })
    }

    /// Whether makeCredential should attach an hmac-secret key
    pub fn wants_hmac_secret(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, ExtensionInput::HmacSecretCreate))
    }

    /// Text supplied through txAuthSimple
    pub fn transaction_text(&self) -> Option<&str> {
        self.inputs.iter().find_map(|input| match input {
            ExtensionInput::TxAuthSimple(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Compute outputs, skipping any extension that fails
    ///
    /// `key_agreement` is the authenticator-wide pair also used by ClientPIN.
    pub fn process(
        &self,
        key_agreement: &KeyPair,
        credential: Option<&CredentialSource>,
    ) -> ExtensionOutputs {
        let mut outputs = ExtensionOutputs::default();

        for input in &self.inputs {
            let output = match input {
                ExtensionInput::HmacSecretCreate => Ok(Value::Bool(true)),
                ExtensionInput::HmacSecretGet(hmac) => {
                    hmac_secret_output(hmac, key_agreement, credential).map(Value::Bytes)
                }
                ExtensionInput::TxAuthSimple(text) => Ok(Value::Text(text.clone())),
            };

            match output {
                Ok(value) => outputs.entries.push((input.name(), value)),
                Err(status) => {
                    debug!(extension = input.name(), %status, "Skipping extension")
                }
            }
        }

        outputs
    }
}

/// Extension outputs keyed by identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionOutputs {
    entries: Vec<(&'static str, Value)>,
}

impl ExtensionOutputs {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifiers present in the output
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    /// Canonical CBOR map; an empty map encodes as the single byte `0xA0`
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut entries = self.entries.clone();
        entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let map = Value::Map(
            entries
                .into_iter()
                .map(|(name, value)| (Value::Text(name.to_string()), value))
                .collect(),
        );
        cbor::encode(&map)
    }
}

fn parse_hmac_secret(value: &Value) -> Result<HmacSecretInput> {
    let map = cbor::as_map(value)?;

    let key_agreement = cbor::map_get_int(map, hmac_keys::KEY_AGREEMENT)
        .ok_or(StatusCode::MissingParameter)?;
    let cose = cbor::as_map(key_agreement)?;
    let x = cose_coordinate(cose, -2)?;
    let y = cose_coordinate(cose, -3)?;

    let salt_enc = cbor::map_get_int(map, hmac_keys::SALT_ENC).ok_or(StatusCode::MissingParameter)?;
    let salt_auth =
        cbor::map_get_int(map, hmac_keys::SALT_AUTH).ok_or(StatusCode::MissingParameter)?;

    Ok(HmacSecretInput {
        x,
        y,
        salt_enc: cbor::as_bytes(salt_enc)?.to_vec(),
        salt_auth: cbor::as_bytes(salt_auth)?.to_vec(),
    })
}

/// Read the x (-2) or y (-3) coordinate of a COSE EC2 key
pub(crate) fn cose_coordinate(cose: &[(Value, Value)], label: i64) -> Result<Vec<u8>> {
    let value = cbor::map_get_int(cose, label).ok_or(StatusCode::MissingParameter)?;
    Ok(cbor::as_bytes(value)?.to_vec())
}

fn hmac_secret_output(
    input: &HmacSecretInput,
    key_agreement: &KeyPair,
    credential: Option<&CredentialSource>,
) -> Result<Vec<u8>> {
    let cred_key = credential
        .and_then(|c| c.hmac_secret.as_ref())
        .ok_or(StatusCode::NoCredentials)?;

    let shared_secret = key_agreement.shared_secret_cose(&input.x, &input.y)?;

    if !v1::verify(&shared_secret, &input.salt_enc, &input.salt_auth) {
        return Err(StatusCode::InvalidParameter);
    }

    let salts = v1::decrypt(&shared_secret, &input.salt_enc)?;
    if salts.len() != 32 && salts.len() != 64 {
        return Err(StatusCode::InvalidParameter);
    }

    let mut output = Vec::with_capacity(salts.len());
    for salt in salts.chunks(32) {
        output.extend_from_slice(&hmac_sha256(cred_key, salt));
    }

    Ok(v1::encrypt(&shared_secret, &output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewCredential;

    fn text_map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k.to_string()), v))
                .collect(),
        )
    }

    fn hmac_input(platform: &KeyPair, authenticator: &KeyPair, salts: &[u8]) -> Value {
        let (x, y) = platform.public_key_cose();
        let (ax, ay) = authenticator.public_key_cose();
        let shared = platform.shared_secret_cose(&ax, &ay).unwrap();

        let salt_enc = v1::encrypt(&shared, salts).unwrap();
        let salt_auth = v1::authenticate(&shared, &salt_enc);

        let cose = Value::Map(vec![
            (Value::Integer(1), Value::Integer(2)),
            (Value::Integer(3), Value::Integer(-25)),
            (Value::Integer(-1), Value::Integer(1)),
            (Value::Integer(-2), Value::Bytes(x.to_vec())),
            (Value::Integer(-3), Value::Bytes(y.to_vec())),
        ]);

        Value::Map(vec![
            (Value::Integer(1), cose),
            (Value::Integer(2), Value::Bytes(salt_enc)),
            (Value::Integer(3), Value::Bytes(salt_auth.to_vec())),
        ])
    }

    #[test]
    fn test_make_credential_hmac_secret() {
        let value = text_map(vec![(ext_ids::HMAC_SECRET, Value::Bool(true))]);
        let exts = Extensions::parse(Some(&value), ExtensionContext::MakeCredential).unwrap();
        assert!(exts.wants_hmac_secret());

        let outputs = exts.process(&KeyPair::generate(), None);
        assert_eq!(outputs.names().collect::<Vec<_>>(), vec![ext_ids::HMAC_SECRET]);
        // {"hmac-secret": true}
        let cbor = outputs.to_cbor().unwrap();
        assert_eq!(cbor[0], 0xa1);
        assert_eq!(*cbor.last().unwrap(), 0xf5);
    }

    #[test]
    fn test_make_credential_hmac_secret_must_be_true() {
        let value = text_map(vec![(ext_ids::HMAC_SECRET, Value::Bool(false))]);
        assert_eq!(
            Extensions::parse(Some(&value), ExtensionContext::MakeCredential),
            Err(StatusCode::InvalidParameter)
        );
    }

    #[test]
    fn test_tx_auth_simple_only_in_get_assertion() {
        let value = text_map(vec![(
            ext_ids::TX_AUTH_SIMPLE,
            Value::Text("Pay 10 EUR?".to_string()),
        )]);

        assert_eq!(
            Extensions::parse(Some(&value), ExtensionContext::MakeCredential),
            Err(StatusCode::UnsupportedExtension)
        );

        let exts = Extensions::parse(Some(&value), ExtensionContext::GetAssertion).unwrap();
        assert_eq!(exts.transaction_text(), Some("Pay 10 EUR?"));
        assert!(!exts.process(&KeyPair::generate(), None).is_empty());
    }

    #[test]
    fn test_unknown_extensions_ignored() {
        let value = text_map(vec![("credProtect", Value::Integer(2))]);
        let exts = Extensions::parse(Some(&value), ExtensionContext::MakeCredential).unwrap();

        let outputs = exts.process(&KeyPair::generate(), None);
        assert!(outputs.is_empty());
        assert_eq!(outputs.to_cbor().unwrap(), vec![0xa0]);
    }

    #[test]
    fn test_output_keys_canonical_order() {
        let value = text_map(vec![
            (ext_ids::TX_AUTH_SIMPLE, Value::Text("ok".to_string())),
            (ext_ids::HMAC_SECRET, hmac_input(&KeyPair::generate(), &KeyPair::generate(), &[0; 32])),
        ]);
        let exts = Extensions::parse(Some(&value), ExtensionContext::GetAssertion).unwrap();

        let credential = CredentialSource::generate(NewCredential {
            rp_id: "example.com".to_string(),
            user_handle: vec![1],
            hmac_secret: true,
            ..Default::default()
        });
        // The salt was encrypted for another authenticator key, so only txAuthSimple survives
        let outputs = exts.process(&KeyPair::generate(), Some(&credential));
        assert_eq!(outputs.names().collect::<Vec<_>>(), vec![ext_ids::TX_AUTH_SIMPLE]);
    }

    #[test]
    fn test_hmac_secret_two_salts() {
        let platform = KeyPair::generate();
        let authenticator = KeyPair::generate();
        let credential = CredentialSource::generate(NewCredential {
            rp_id: "example.com".to_string(),
            user_handle: vec![1],
            hmac_secret: true,
            ..Default::default()
        });

        let mut salts = [0x11u8; 64];
        salts[32..].fill(0x22);
        let value = text_map(vec![(
            ext_ids::HMAC_SECRET,
            hmac_input(&platform, &authenticator, &salts),
        )]);
        let exts = Extensions::parse(Some(&value), ExtensionContext::GetAssertion).unwrap();
        let outputs = exts.process(&authenticator, Some(&credential));

        let (_, Value::Bytes(encrypted)) = &outputs.entries[0] else {
            panic!("hmac-secret output must be a byte string");
        };

        let (ax, ay) = authenticator.public_key_cose();
        let shared = platform.shared_secret_cose(&ax, &ay).unwrap();
        let plain = v1::decrypt(&shared, encrypted).unwrap();

        let key = credential.hmac_secret.unwrap();
        assert_eq!(&plain[..32], &hmac_sha256(&key, &salts[..32]));
        assert_eq!(&plain[32..], &hmac_sha256(&key, &salts[32..]));
    }

    #[test]
    fn test_hmac_secret_without_credential_key_is_skipped() {
        let platform = KeyPair::generate();
        let authenticator = KeyPair::generate();
        let credential = CredentialSource::generate(NewCredential {
            rp_id: "example.com".to_string(),
            user_handle: vec![1],
            ..Default::default()
        });

        let value = text_map(vec![(
            ext_ids::HMAC_SECRET,
            hmac_input(&platform, &authenticator, &[0x33; 32]),
        )]);
        let exts = Extensions::parse(Some(&value), ExtensionContext::GetAssertion).unwrap();
        assert!(exts.process(&authenticator, Some(&credential)).is_empty());
    }

    #[test]
    fn test_hmac_secret_missing_salt() {
        let value = text_map(vec![(
            ext_ids::HMAC_SECRET,
            Value::Map(vec![(Value::Integer(2), Value::Bytes(vec![0; 32]))]),
        )]);
        assert_eq!(
            Extensions::parse(Some(&value), ExtensionContext::GetAssertion),
            Err(StatusCode::MissingParameter)
        );
    }
}
