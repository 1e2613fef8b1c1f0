//! authenticatorMakeCredential command
//!
//! Creates a new credential for a relying party.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorMakeCredential>

use crate::{
    attestation::Attestation,
    auth_data::{self, AttestedCredentialData, AuthenticatorData},
    authenticator::Authenticator,
    callbacks::{AuthenticatorCallbacks, ConsentRequest, PromptKind},
    cbor::{self, MapParser, Value},
    commands::{check_pin_params, option_flag},
    extensions::{ExtensionContext, Extensions},
    probe,
    status::{Result, StatusCode},
    types::{
        CredentialSource, NewCredential, PUBLIC_KEY_TYPE, PublicKeyCredentialDescriptor,
        PublicKeyCredentialParameters, RelyingParty, User,
    },
};

use authorizer_crypto::{ecdsa, sha256};

use tracing::{debug, info};

/// MakeCredential request parameter keys
mod req_keys {
    pub const CLIENT_DATA_HASH: i32 = 0x01;
    pub const RP: i32 = 0x02;
    pub const USER: i32 = 0x03;
    pub const PUB_KEY_CRED_PARAMS: i32 = 0x04;
    pub const EXCLUDE_LIST: i32 = 0x05;
    pub const EXTENSIONS: i32 = 0x06;
    pub const OPTIONS: i32 = 0x07;
    pub const PIN_AUTH: i32 = 0x08;
    pub const PIN_PROTOCOL: i32 = 0x09;
}

/// Maximum user handle length
const MAX_USER_ID_LENGTH: usize = 64;

/// Options in the request
///
/// Resident keys and user verification are always provided, so `rk` and `uv`
/// are accepted but do not change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MakeCredentialOptions {
    rk: bool,
    up: bool,
    uv: bool,
}

impl Default for MakeCredentialOptions {
    fn default() -> Self {
        Self {
            rk: false,
            up: true,
            uv: false,
        }
    }
}

/// Decoded makeCredential parameters
#[derive(Debug)]
struct MakeCredentialRequest {
    client_data_hash: Vec<u8>,
    rp: RelyingParty,
    user: User,
    pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    exclude_list: Vec<PublicKeyCredentialDescriptor>,
    extensions: Option<Value>,
    options: MakeCredentialOptions,
    pin_auth: Option<Vec<u8>>,
    pin_protocol: Option<u8>,
}

impl MakeCredentialRequest {
    fn parse(data: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(data)?;

        Ok(Self {
            client_data_hash: parser.get_bytes(req_keys::CLIENT_DATA_HASH)?,
            rp: parser.get(req_keys::RP)?,
            user: parser.get(req_keys::USER)?,
            pub_key_cred_params: parser.get(req_keys::PUB_KEY_CRED_PARAMS)?,
            exclude_list: parser
                .get_opt(req_keys::EXCLUDE_LIST)?
                .unwrap_or_default(),
            extensions: parser.get_raw(req_keys::EXTENSIONS).cloned(),
            options: parse_options(parser.get_raw(req_keys::OPTIONS))?,
            pin_auth: parser.get_bytes_opt(req_keys::PIN_AUTH)?,
            pin_protocol: parser.get_opt(req_keys::PIN_PROTOCOL)?,
        })
    }

    fn is_probe(&self) -> bool {
        probe::is_probe_make_credential(&self.rp.id, self.user.name.as_deref())
    }

    fn check_well_formed(&self) -> Result<()> {
        if self.client_data_hash.len() != 32 {
            return Err(StatusCode::InvalidLength);
        }
        if self.user.id.is_empty() || self.user.id.len() > MAX_USER_ID_LENGTH {
            return Err(StatusCode::InvalidLength);
        }
        check_pin_params(self.pin_auth.as_deref(), self.pin_protocol)
    }

    fn supports_es256(&self) -> bool {
        self.pub_key_cred_params
            .iter()
            .any(|p| p.cred_type == PUBLIC_KEY_TYPE && p.alg == ecdsa::COSE_ALG_ES256)
    }

    fn consent_request(&self, kind: PromptKind) -> ConsentRequest {
        ConsentRequest::new(kind)
            .with_rp(self.rp.id.clone(), self.rp.name.clone())
            .with_user(self.user.name.clone(), self.user.display_name.clone())
    }
}

/// Handle authenticatorMakeCredential command
pub fn handle<C: AuthenticatorCallbacks>(auth: &Authenticator<C>, data: &[u8]) -> Result<Vec<u8>> {
    let request = MakeCredentialRequest::parse(data)?;

    if request.is_probe() {
        return handle_probe(auth, &request);
    }

    request.check_well_formed()?;
    debug!(rp_id = %request.rp.id, options = ?request.options, "makeCredential");

    // 1. Exclude list
    for descriptor in &request.exclude_list {
        if descriptor.cred_type != PUBLIC_KEY_TYPE {
            continue;
        }
        let existing = auth.callbacks().credential_by_id(&descriptor.id)?;
        if existing.is_some_and(|c| c.rp_id == request.rp.id) {
            auth.confirm_dialog(&request.consent_request(PromptKind::CredentialExcluded));
            return Err(StatusCode::CredentialExcluded);
        }
    }

    // 2. Algorithm
    if !request.supports_es256() {
        return Err(StatusCode::UnsupportedAlgorithm);
    }

    // 3. Extensions; inputs are validated here, outputs computed later
    let extensions =
        Extensions::parse(request.extensions.as_ref(), ExtensionContext::MakeCredential)?;

    // 4. PIN
    auth.verify_pin_auth(request.pin_auth.as_deref(), &request.client_data_hash, true)?;

    // 5. Consent before anything is created, so a refusal leaves no trace
    if !auth.confirm_dialog(&request.consent_request(PromptKind::MakeCredential)) {
        return Err(StatusCode::OperationDenied);
    }

    // 6. Credential
    let credential = auth.callbacks().generate_credential(NewCredential {
        rp_id: request.rp.id.clone(),
        rp_name: request.rp.name.clone(),
        user_handle: request.user.id.clone(),
        user_name: request.user.name.clone(),
        user_display_name: request.user.display_name.clone(),
        u2f_rp_id: None,
        hmac_secret: extensions.wants_hmac_secret(),
    })?;

    // 7. Attestation
    match attest(auth, &request, &extensions, &credential) {
        Ok(response) => {
            info!(rp_id = %request.rp.id, "Credential created");
            Ok(response)
        }
        Err(status) => {
            auth.callbacks().delete_credential(&credential.id)?;
            Err(status)
        }
    }
}

fn attest<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &MakeCredentialRequest,
    extensions: &Extensions,
    credential: &CredentialSource,
) -> Result<Vec<u8>> {
    let outputs = extensions.process(auth.session().key_agreement(), Some(credential));

    let attested = AttestedCredentialData {
        aaguid: auth.config().aaguid,
        credential_id: credential.id.clone(),
        public_key: auth_data::cose_es256_public_key(&credential.public_key()?)?,
    };

    let auth_data = AuthenticatorData::new(sha256(request.rp.id.as_bytes()), credential.use_counter)
        .with_user_verified(true)
        .with_attested(attested)
        .with_extensions(outputs.to_cbor()?)
        .to_bytes()?;

    Attestation::self_signed(&credential.private_key, &auth_data, &request.client_data_hash)
        .encode(&auth_data)
}

/// A platform probe: ask the user, then answer without creating anything
fn handle_probe<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &MakeCredentialRequest,
) -> Result<Vec<u8>> {
    debug!(rp_id = %request.rp.id, "makeCredential probe");

    if !auth.confirm_dialog(&request.consent_request(PromptKind::MakeCredential)) {
        return Err(StatusCode::OperationDenied);
    }

    let auth_data = AuthenticatorData::new(sha256(request.rp.id.as_bytes()), 0).to_bytes()?;
    Attestation::None.encode(&auth_data)
}

fn parse_options(value: Option<&Value>) -> Result<MakeCredentialOptions> {
    let mut options = MakeCredentialOptions::default();
    let Some(value) = value else {
        return Ok(options);
    };

    let map = cbor::as_map(value)?;
    if let Some(rk) = option_flag(map, "rk")? {
        options.rk = rk;
    }
    if let Some(up) = option_flag(map, "up")? {
        options.up = up;
    }
    if let Some(uv) = option_flag(map, "uv")? {
        options.uv = uv;
    }
    Ok(options)
}
