//! CTAP Command Dispatcher
//!
//! Routes CTAP2 requests to their handlers and frames the reply as a status
//! byte followed by the CBOR response body.

use crate::authenticator::{Authenticator, CancelToken};
use crate::callbacks::AuthenticatorCallbacks;
use crate::commands::{self, CommandCode, expect_no_parameters};
use crate::status::{Result, StatusCode};

use tracing::{debug, info};

/// Dispatch a CTAP2 request
///
/// The input data format is:
/// - First byte: command code
/// - Remaining bytes: CBOR-encoded command parameters
///
/// Returns the CBOR-encoded response body, or a status code on error.
pub fn dispatch<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &[u8],
) -> Result<Vec<u8>> {
    let (&code, data) = request.split_first().ok_or(StatusCode::InvalidLength)?;
    if data.len() > auth.config().max_msg_size {
        return Err(StatusCode::RequestTooLarge);
    }

    let command = CommandCode::from_u8(code).ok_or(StatusCode::InvalidCommand)?;
    debug!(?command, len = data.len(), "CTAP2 request");
    if command.is_parameterless() {
        expect_no_parameters(data)?;
    }

    match command {
        CommandCode::MakeCredential => commands::make_credential::handle(auth, data),
        CommandCode::GetAssertion => commands::get_assertion::handle(auth, data),
        CommandCode::GetInfo => commands::get_info::handle(auth),
        CommandCode::ClientPin => commands::client_pin::handle(auth, data),
        CommandCode::Reset => {
            auth.reset()?;
            Ok(Vec::new())
        }
        CommandCode::GetNextAssertion => commands::get_next_assertion::handle(),
        CommandCode::Selection => commands::selection::handle(),
    }
}

/// Dispatch a CTAP2 request and frame the reply
///
/// The reply always starts with a status byte; the response body follows
/// only on success. Once `token` is cancelled the command shows no further
/// prompts and every pending one is refused.
pub fn handle_command<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &[u8],
    token: CancelToken,
) -> Vec<u8> {
    auth.begin_command(token);
    let result = dispatch(auth, request);
    auth.end_command();

    match result {
        Ok(body) => {
            let mut reply = Vec::with_capacity(1 + body.len());
            reply.push(StatusCode::Success.to_u8());
            reply.extend_from_slice(&body);
            reply
        }
        Err(status) => {
            info!(%status, "CTAP2 request failed");
            vec![status.to_u8()]
        }
    }
}

impl<C: AuthenticatorCallbacks> Authenticator<C> {
    /// Process one CTAP2 request: command byte followed by CBOR parameters
    pub fn handle_command(&self, request: &[u8]) -> Vec<u8> {
        handle_command(self, request, CancelToken::new())
    }

    /// Like [`Authenticator::handle_command`], cancelled through `token`
    pub fn handle_cancellable_command(&self, request: &[u8], token: CancelToken) -> Vec<u8> {
        handle_command(self, request, token)
    }
}
