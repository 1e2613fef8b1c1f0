//! authenticatorClientPIN command
//!
//! Handles PIN management operations including:
//! - Getting PIN retry counter
//! - Getting key agreement
//! - Setting PIN
//! - Changing PIN
//! - Getting PIN token
//!
//! Only PIN protocol one is spoken.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorClientPIN>

use crate::auth_data;
use crate::authenticator::Authenticator;
use crate::callbacks::AuthenticatorCallbacks;
use crate::cbor::{self, MapBuilder, MapParser};
use crate::extensions::cose_coordinate;
use crate::status::{Result, StatusCode};

use authorizer_crypto::pin_protocol::{AUTH_TAG_SIZE, v1};

use tracing::debug;

/// ClientPIN subcommand codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubCommand {
    GetRetries = 0x01,
    GetKeyAgreement = 0x02,
    SetPin = 0x03,
    ChangePin = 0x04,
    GetPinToken = 0x05,
}

impl SubCommand {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GetRetries),
            0x02 => Ok(Self::GetKeyAgreement),
            0x03 => Ok(Self::SetPin),
            0x04 => Ok(Self::ChangePin),
            0x05 => Ok(Self::GetPinToken),
            _ => Err(StatusCode::InvalidParameter),
        }
    }
}

/// Request keys
mod req_keys {
    pub const PIN_PROTOCOL: i32 = 0x01;
    pub const SUBCOMMAND: i32 = 0x02;
    pub const KEY_AGREEMENT: i32 = 0x03;
    pub const PIN_AUTH: i32 = 0x04;
    pub const NEW_PIN_ENC: i32 = 0x05;
    pub const PIN_HASH_ENC: i32 = 0x06;
}

/// Response keys
mod resp_keys {
    pub const KEY_AGREEMENT: i32 = 0x01;
    pub const PIN_TOKEN: i32 = 0x02;
    pub const RETRIES: i32 = 0x03;
}

/// Shortest accepted newPinEnc: a PIN padded to 64 bytes
const MIN_NEW_PIN_ENC_LENGTH: usize = 64;

/// Encrypted LEFT(SHA-256(pin), 16)
const PIN_HASH_ENC_LENGTH: usize = 16;

/// Platform public key as COSE coordinates
struct PlatformKey {
    x: Vec<u8>,
    y: Vec<u8>,
}

/// Decoded clientPIN parameters
struct ClientPinRequest {
    subcommand: SubCommand,
    key_agreement: Option<PlatformKey>,
    pin_auth: Option<Vec<u8>>,
    new_pin_enc: Option<Vec<u8>>,
    pin_hash_enc: Option<Vec<u8>>,
}

impl ClientPinRequest {
    fn parse(data: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(data)?;

        let protocol: u8 = parser.get(req_keys::PIN_PROTOCOL)?;
        if protocol != 1 {
            return Err(StatusCode::PinAuthInvalid);
        }
        let subcommand = SubCommand::from_u8(parser.get(req_keys::SUBCOMMAND)?)?;

        let key_agreement = match parser.get_raw(req_keys::KEY_AGREEMENT) {
            Some(value) => {
                let cose = cbor::as_map(value)?;
                Some(PlatformKey {
                    x: cose_coordinate(cose, -2)?,
                    y: cose_coordinate(cose, -3)?,
                })
            }
            None => None,
        };

        let request = Self {
            subcommand,
            key_agreement,
            pin_auth: parser.get_bytes_opt(req_keys::PIN_AUTH)?,
            new_pin_enc: parser.get_bytes_opt(req_keys::NEW_PIN_ENC)?,
            pin_hash_enc: parser.get_bytes_opt(req_keys::PIN_HASH_ENC)?,
        };
        request.check_lengths()?;
        Ok(request)
    }

    fn check_lengths(&self) -> Result<()> {
        if self.pin_auth.as_ref().is_some_and(|a| a.len() != AUTH_TAG_SIZE) {
            return Err(StatusCode::InvalidLength);
        }
        if self
            .new_pin_enc
            .as_ref()
            .is_some_and(|e| e.len() < MIN_NEW_PIN_ENC_LENGTH)
        {
            return Err(StatusCode::InvalidLength);
        }
        if self
            .pin_hash_enc
            .as_ref()
            .is_some_and(|e| e.len() != PIN_HASH_ENC_LENGTH)
        {
            return Err(StatusCode::InvalidLength);
        }
        Ok(())
    }

    fn platform_key(&self) -> Result<&PlatformKey> {
        self.key_agreement.as_ref().ok_or(StatusCode::MissingParameter)
    }
}

fn required(value: &Option<Vec<u8>>) -> Result<&[u8]> {
    value.as_deref().ok_or(StatusCode::MissingParameter)
}

/// Handle authenticatorClientPIN command
pub fn handle<C: AuthenticatorCallbacks>(auth: &Authenticator<C>, data: &[u8]) -> Result<Vec<u8>> {
    let request = ClientPinRequest::parse(data)?;
    debug!(subcommand = ?request.subcommand, "clientPIN");

    match request.subcommand {
        SubCommand::GetRetries => get_retries(auth),
        SubCommand::GetKeyAgreement => get_key_agreement(auth),
        SubCommand::SetPin => set_pin(auth, &request),
        SubCommand::ChangePin => change_pin(auth, &request),
        SubCommand::GetPinToken => get_pin_token(auth, &request),
    }
}

fn get_retries<C: AuthenticatorCallbacks>(auth: &Authenticator<C>) -> Result<Vec<u8>> {
    MapBuilder::new()
        .insert(resp_keys::RETRIES, auth.pin_retries())?
        .build()
}

fn get_key_agreement<C: AuthenticatorCallbacks>(auth: &Authenticator<C>) -> Result<Vec<u8>> {
    let (x, y) = auth.key_agreement_public();
    let key_agreement = auth_data::cose_key_agreement(&x, &y)?.build_value()?;

    MapBuilder::new()
        .insert(resp_keys::KEY_AGREEMENT, key_agreement)?
        .build()
}

fn set_pin<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &ClientPinRequest,
) -> Result<Vec<u8>> {
    let platform = request.platform_key()?;
    let pin_auth = required(&request.pin_auth)?;
    let new_pin_enc = required(&request.new_pin_enc)?;

    if auth.is_pin_set() {
        return Err(StatusCode::PinAuthInvalid);
    }

    let shared_secret = auth.shared_secret(&platform.x, &platform.y)?;
    if !v1::verify(&shared_secret, new_pin_enc, pin_auth) {
        return Err(StatusCode::PinAuthInvalid);
    }

    auth.store_new_pin(&shared_secret, new_pin_enc)?;
    Ok(Vec::new())
}

/// Refuse PIN use once retries or this session's attempts are exhausted
fn check_not_blocked<C: AuthenticatorCallbacks>(auth: &Authenticator<C>) -> Result<()> {
    if auth.pin_retries() == 0 {
        return Err(StatusCode::PinBlocked);
    }
    if auth.is_pin_auth_blocked() {
        return Err(StatusCode::PinAuthBlocked);
    }
    Ok(())
}

fn change_pin<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &ClientPinRequest,
) -> Result<Vec<u8>> {
    let platform = request.platform_key()?;
    let pin_auth = required(&request.pin_auth)?;
    let new_pin_enc = required(&request.new_pin_enc)?;
    let pin_hash_enc = required(&request.pin_hash_enc)?;

    check_not_blocked(auth)?;

    let shared_secret = auth.shared_secret(&platform.x, &platform.y)?;
    let mut signed = Vec::with_capacity(new_pin_enc.len() + pin_hash_enc.len());
    signed.extend_from_slice(new_pin_enc);
    signed.extend_from_slice(pin_hash_enc);
    if !v1::verify(&shared_secret, &signed, pin_auth) {
        return Err(StatusCode::PinAuthInvalid);
    }

    auth.verify_pin_hash_enc(&shared_secret, pin_hash_enc)?;
    auth.store_new_pin(&shared_secret, new_pin_enc)?;
    Ok(Vec::new())
}

fn get_pin_token<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &ClientPinRequest,
) -> Result<Vec<u8>> {
    let platform = request.platform_key()?;
    let pin_hash_enc = required(&request.pin_hash_enc)?;

    check_not_blocked(auth)?;

    let shared_secret = auth.shared_secret(&platform.x, &platform.y)?;
    auth.verify_pin_hash_enc(&shared_secret, pin_hash_enc)?;

    let token = *auth.pin().token();
    let token_enc = v1::encrypt(&shared_secret, &token)?;

    MapBuilder::new()
        .insert_bytes(resp_keys::PIN_TOKEN, &token_enc)?
        .build()
}
