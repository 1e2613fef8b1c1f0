//! CTAP command handlers
//!
//! This module contains the implementations of the CTAP 2.0 commands. Each
//! handler takes the CBOR parameter map (without the command byte) and
//! returns the CBOR response body (without the status byte).
//!
//! See FIDO2 spec section 5 for command definitions:
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticator-api>

pub mod client_pin;
pub mod get_assertion;
pub mod get_info;
pub mod get_next_assertion;
pub mod make_credential;
pub mod selection;

use crate::cbor::{self, Value};
use crate::status::{Result, StatusCode};

/// CTAP command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    GetInfo = 0x04,
    ClientPin = 0x06,
    Reset = 0x07,
    GetNextAssertion = 0x08,
    Selection = 0x0B,
}

impl CommandCode {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MakeCredential),
            0x02 => Some(Self::GetAssertion),
            0x04 => Some(Self::GetInfo),
            0x06 => Some(Self::ClientPin),
            0x07 => Some(Self::Reset),
            0x08 => Some(Self::GetNextAssertion),
            0x0B => Some(Self::Selection),
            _ => None,
        }
    }

    /// Commands that take no parameters
    pub fn is_parameterless(self) -> bool {
        matches!(
            self,
            Self::GetInfo | Self::Reset | Self::GetNextAssertion | Self::Selection
        )
    }
}

/// A parameterless command accepts no body or an empty map
pub(crate) fn expect_no_parameters(data: &[u8]) -> Result<()> {
    match data {
        [] | [0xA0] => Ok(()),
        _ => Err(StatusCode::InvalidLength),
    }
}

/// Well-formedness of pinAuth and pinProtocol in makeCredential and getAssertion
///
/// pinAuth may be empty (a platform probing for PIN support) or 16 bytes.
pub(crate) fn check_pin_params(pin_auth: Option<&[u8]>, pin_protocol: Option<u8>) -> Result<()> {
    match (pin_auth, pin_protocol) {
        (None, None) => Ok(()),
        (None, Some(_)) | (Some(_), None) => Err(StatusCode::MissingParameter),
        (Some(auth), Some(protocol)) => {
            if !auth.is_empty() && auth.len() != authorizer_crypto::pin_protocol::AUTH_TAG_SIZE {
                return Err(StatusCode::InvalidLength);
            }
            if protocol != 1 {
                return Err(StatusCode::PinAuthInvalid);
            }
            Ok(())
        }
    }
}

/// Read an optional boolean from an options map
pub(crate) fn option_flag(options: &[(Value, Value)], name: &str) -> Result<Option<bool>> {
    cbor::map_get(options, name).map(cbor::as_bool).transpose()
}
