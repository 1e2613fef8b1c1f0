//! authenticatorGetInfo command
//!
//! Returns information about the authenticator including:
//! - Supported versions and extensions
//! - AAGUID
//! - Options (rk, up, uv, clientPin)
//! - PIN protocols and limits
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorGetInfo>

use crate::{
    authenticator::Authenticator,
    callbacks::AuthenticatorCallbacks,
    cbor::{MapBuilder, Value},
    extensions,
    status::Result,
    types::PUBLIC_KEY_TYPE,
};

use authorizer_crypto::ecdsa;

/// GetInfo response keys
mod keys {
    pub const VERSIONS: i32 = 0x01;
    pub const EXTENSIONS: i32 = 0x02;
    pub const AAGUID: i32 = 0x03;
    pub const OPTIONS: i32 = 0x04;
    pub const MAX_MSG_SIZE: i32 = 0x05;
    pub const PIN_PROTOCOLS: i32 = 0x06;
    pub const MAX_CREDENTIAL_COUNT_IN_LIST: i32 = 0x07;
    pub const MAX_CREDENTIAL_ID_LENGTH: i32 = 0x08;
    pub const TRANSPORTS: i32 = 0x09;
    pub const ALGORITHMS: i32 = 0x0A;
}

const VERSIONS: [&str; 2] = ["FIDO_2_0", "U2F_V2"];

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Handle authenticatorGetInfo command
///
/// This command requires no input and returns the authenticator's capabilities.
pub fn handle<C: AuthenticatorCallbacks>(auth: &Authenticator<C>) -> Result<Vec<u8>> {
    let config = auth.config();

    // Text keys in canonical order: by encoded length, then bytewise
    let options = Value::Map(vec![
        (text("rk"), Value::Bool(true)),
        (text("up"), Value::Bool(true)),
        (text("uv"), Value::Bool(true)),
        (text("plat"), Value::Bool(false)),
        (text("clientPin"), Value::Bool(auth.is_pin_set())),
    ]);

    let algorithms = Value::Array(vec![Value::Map(vec![
        (text("alg"), Value::Integer(ecdsa::COSE_ALG_ES256.into())),
        (text("type"), text(PUBLIC_KEY_TYPE)),
    ])]);

    MapBuilder::new()
        .insert(keys::VERSIONS, VERSIONS)?
        .insert(keys::EXTENSIONS, extensions::SUPPORTED)?
        .insert_bytes(keys::AAGUID, &config.aaguid)?
        .insert(keys::OPTIONS, options)?
        .insert(keys::MAX_MSG_SIZE, config.max_msg_size as u64)?
        .insert(keys::PIN_PROTOCOLS, [1u8])?
        .insert(
            keys::MAX_CREDENTIAL_COUNT_IN_LIST,
            config.max_credential_count_in_list as u64,
        )?
        .insert(
            keys::MAX_CREDENTIAL_ID_LENGTH,
            config.max_credential_id_length as u64,
        )?
        .insert(keys::TRANSPORTS, &config.transports)?
        .insert(keys::ALGORITHMS, algorithms)?
        .build()
}
