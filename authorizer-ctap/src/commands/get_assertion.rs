//! authenticatorGetAssertion command
//!
//! Authenticates a user with an existing credential. A request with `up`
//! false is a preflight: the platform learns which credential would be used
//! without the user being asked, and the next real request reuses that choice.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorGetAssertion>

use crate::{
    auth_data::{self, AuthenticatorData},
    authenticator::Authenticator,
    callbacks::{AuthenticatorCallbacks, ConsentRequest, PromptKind},
    cbor::{self, MapBuilder, MapParser, Value},
    commands::{check_pin_params, option_flag},
    extensions::{ExtensionContext, Extensions},
    status::{Result, StatusCode},
    types::{CredentialSource, PUBLIC_KEY_TYPE, PublicKeyCredentialDescriptor},
};

use authorizer_crypto::ecdsa;

use tracing::{debug, warn};

/// GetAssertion request parameter keys
mod req_keys {
    pub const RP_ID: i32 = 0x01;
    pub const CLIENT_DATA_HASH: i32 = 0x02;
    pub const ALLOW_LIST: i32 = 0x03;
    pub const EXTENSIONS: i32 = 0x04;
    pub const OPTIONS: i32 = 0x05;
    pub const PIN_AUTH: i32 = 0x06;
    pub const PIN_PROTOCOL: i32 = 0x07;
}

/// GetAssertion response keys
mod resp_keys {
    pub const CREDENTIAL: i32 = 0x01;
    pub const AUTH_DATA: i32 = 0x02;
    pub const SIGNATURE: i32 = 0x03;
    pub const USER: i32 = 0x04;
    pub const NUMBER_OF_CREDENTIALS: i32 = 0x05;
}

/// Options in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GetAssertionOptions {
    up: bool,
    uv: bool,
}

impl GetAssertionOptions {
    /// Without user presence nobody is asked and nothing changes
    fn is_preflight(self) -> bool {
        !self.up
    }
}

impl Default for GetAssertionOptions {
    fn default() -> Self {
        Self { up: true, uv: false }
    }
}

/// Decoded getAssertion parameters
#[derive(Debug)]
struct GetAssertionRequest {
    rp_id: String,
    client_data_hash: Vec<u8>,
    allow_list: Vec<PublicKeyCredentialDescriptor>,
    extensions: Option<Value>,
    options: GetAssertionOptions,
    pin_auth: Option<Vec<u8>>,
    pin_protocol: Option<u8>,
}

impl GetAssertionRequest {
    fn parse(data: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(data)?;

        let request = Self {
            rp_id: parser.get(req_keys::RP_ID)?,
            client_data_hash: parser.get_bytes(req_keys::CLIENT_DATA_HASH)?,
            allow_list: parser.get_opt(req_keys::ALLOW_LIST)?.unwrap_or_default(),
            extensions: parser.get_raw(req_keys::EXTENSIONS).cloned(),
            options: parse_options(parser.get_raw(req_keys::OPTIONS))?,
            pin_auth: parser.get_bytes_opt(req_keys::PIN_AUTH)?,
            pin_protocol: parser.get_opt(req_keys::PIN_PROTOCOL)?,
        };

        if request.client_data_hash.len() != 32 {
            return Err(StatusCode::InvalidLength);
        }
        check_pin_params(request.pin_auth.as_deref(), request.pin_protocol)?;
        Ok(request)
    }

    fn is_allowed(&self, credential: &CredentialSource) -> bool {
        self.allow_list.is_empty()
            || self
                .allow_list
                .iter()
                .any(|d| d.cred_type == PUBLIC_KEY_TYPE && d.id == credential.id)
    }
}

/// A signed assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assertion {
    pub auth_data: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Sign `authData || clientDataHash` with a stored credential
///
/// A preflight signs with a throwaway key over a zero counter so the stored
/// credential is left untouched. Shared with U2F authentication.
pub(crate) fn sign_assertion<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    credential: &CredentialSource,
    client_data_hash: &[u8],
    user_verified: bool,
    preflight: bool,
    extensions: Vec<u8>,
) -> Result<Assertion> {
    let counter = if preflight {
        0
    } else {
        auth.callbacks().increment_counter(&credential.id)?
    };

    let auth_data = AuthenticatorData::new(auth_data::credential_rp_id_hash(credential)?, counter)
        .with_user_verified(user_verified)
        .with_extensions(extensions)
        .to_bytes()?;

    let mut message = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    message.extend_from_slice(&auth_data);
    message.extend_from_slice(client_data_hash);

    let signature = if preflight {
        let (throwaway, _) = ecdsa::generate_keypair();
        ecdsa::sign(&throwaway, &message)?
    } else {
        ecdsa::sign(&credential.private_key, &message)?
    };

    Ok(Assertion {
        auth_data,
        signature,
    })
}

/// Handle authenticatorGetAssertion command
pub fn handle<C: AuthenticatorCallbacks>(auth: &Authenticator<C>, data: &[u8]) -> Result<Vec<u8>> {
    let request = GetAssertionRequest::parse(data)?;
    let preflight = request.options.is_preflight();
    debug!(rp_id = %request.rp_id, preflight, "getAssertion");

    let extensions = Extensions::parse(request.extensions.as_ref(), ExtensionContext::GetAssertion)?;

    // 1. Candidates
    let candidates: Vec<CredentialSource> = auth
        .callbacks()
        .credentials_for_rp(&request.rp_id)?
        .into_iter()
        .filter(|c| request.is_allowed(c))
        .collect();
    if candidates.is_empty() {
        return Err(StatusCode::NoCredentials);
    }

    // 2. PIN
    let user_verified =
        auth.verify_pin_auth(request.pin_auth.as_deref(), &request.client_data_hash, false)?;

    // 3. Selection
    let credential = select(auth, &request.rp_id, &candidates, preflight)?;

    // 4. Extensions need the selected credential
    let outputs = extensions.process(auth.session().key_agreement(), Some(&credential));

    // 5. Consent
    if preflight {
        auth.session().remember_preflight(credential.id.clone());
    } else {
        let consent = ConsentRequest::new(PromptKind::GetAssertion)
            .with_rp(credential.rp_id.clone(), credential.rp_name.clone())
            .with_user(
                credential.user_name.clone(),
                credential.user_display_name.clone(),
            )
            .with_transaction_text(extensions.transaction_text().map(str::to_string));
        if !auth.confirm_dialog(&consent) {
            return Err(StatusCode::OperationDenied);
        }
    }

    // 6. Signature
    let assertion = sign_assertion(
        auth,
        &credential,
        &request.client_data_hash,
        user_verified,
        preflight,
        outputs.to_cbor()?,
    )
    .map_err(|status| {
        warn!(%status, "Failed to sign assertion");
        StatusCode::Other
    })?;

    let descriptor = Value::Map(vec![
        (Value::Text("id".to_string()), Value::Bytes(credential.id.clone())),
        (
            Value::Text("type".to_string()),
            Value::Text(PUBLIC_KEY_TYPE.to_string()),
        ),
    ]);
    let user = (!credential.user_handle.is_empty()).then(|| {
        Value::Map(vec![(
            Value::Text("id".to_string()),
            Value::Bytes(credential.user_handle.clone()),
        )])
    });
    let count = (candidates.len() > 1).then_some(candidates.len() as u64);

    MapBuilder::new()
        .insert(resp_keys::CREDENTIAL, descriptor)?
        .insert_bytes(resp_keys::AUTH_DATA, &assertion.auth_data)?
        .insert_bytes(resp_keys::SIGNATURE, &assertion.signature)?
        .insert_opt(resp_keys::USER, user)?
        .insert_opt(resp_keys::NUMBER_OF_CREDENTIALS, count)?
        .build()
}

/// Pick the credential to sign with
///
/// A real request following a preflight reuses the credential the preflight
/// picked, as long as it is still a candidate.
fn select<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    rp_id: &str,
    candidates: &[CredentialSource],
    preflight: bool,
) -> Result<CredentialSource> {
    if !preflight {
        let remembered = auth.session().take_preflight();
        if let Some(id) = remembered {
            if let Some(credential) = candidates.iter().find(|c| c.id == id) {
                debug!("Reusing preflight selection");
                return Ok(credential.clone());
            }
        }
    }

    if let [only] = candidates {
        return Ok(only.clone());
    }

    let pending = auth.callbacks().select_credential(rp_id, candidates);
    auth.await_prompt(pending)
        .and_then(|index| candidates.get(index))
        .cloned()
        .ok_or(StatusCode::Other)
}

fn parse_options(value: Option<&Value>) -> Result<GetAssertionOptions> {
    let Some(value) = value else {
        return Ok(GetAssertionOptions::default());
    };

    let map = cbor::as_map(value)?;
    match (option_flag(map, "up")?, option_flag(map, "uv")?) {
        (None, None) => Ok(GetAssertionOptions::default()),
        (Some(up), None) => Ok(GetAssertionOptions { up, uv: !up }),
        (None, Some(uv)) => Ok(GetAssertionOptions { up: !uv, uv }),
        (Some(up), Some(uv)) if up == uv => Err(StatusCode::UnsupportedOption),
        (Some(up), Some(uv)) => Ok(GetAssertionOptions { up, uv }),
    }
}
