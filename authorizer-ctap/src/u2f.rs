//! U2F raw message processing
//!
//! Register, Authenticate and Version over the same credential safe as CTAP2.
//! Operations that need the user's touch are computed up front and handed
//! back with `needs_presence` set; the transport layer polls a presence
//! prompt and only releases the response once the user confirms.
//!
//! Spec: <https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html>

use crate::{
    apdu::{Apdu, StatusWord},
    auth_data,
    authenticator::Authenticator,
    callbacks::{AuthenticatorCallbacks, ConsentRequest, PromptKind},
    commands::get_assertion::sign_assertion,
    facets::U2F_RP_NAME,
    probe,
    prompt::PendingPrompt,
    types::{CredentialSource, NewCredential},
};

use authorizer_crypto::{ecdsa, x509};

use tracing::{debug, info, warn};

/// Version string answered to U2F_VERSION
pub const U2F_VERSION: &[u8] = b"U2F_V2";

/// Pre-standard version request some clients still send
pub const LEGACY_VERSION_PROBE: [u8; 9] = [0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Reserved first byte of a registration response
const REGISTER_ID: u8 = 0x05;

/// Reserved first byte of the signed registration data
const REGISTER_SIGN_PREFIX: u8 = 0x00;

/// Common name of the self-signed attestation certificate
const ATTESTATION_CN: &str = "authorizer U2F";

mod ins {
    pub const REGISTER: u8 = 0x01;
    pub const AUTHENTICATE: u8 = 0x02;
    pub const VERSION: u8 = 0x03;
}

/// Authenticate control byte (P1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlByte {
    EnforcePresence = 0x03,
    CheckOnly = 0x07,
    DontEnforcePresence = 0x08,
}

impl ControlByte {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Self::EnforcePresence),
            0x07 => Some(Self::CheckOnly),
            0x08 => Some(Self::DontEnforcePresence),
            _ => None,
        }
    }
}

/// A validated U2F request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum U2fRequest {
    Register {
        challenge: [u8; 32],
        application: [u8; 32],
    },
    Authenticate {
        control: ControlByte,
        challenge: [u8; 32],
        application: [u8; 32],
        key_handle: Vec<u8>,
    },
    Version,
}

impl U2fRequest {
    /// Validate an APDU: instruction first, then parameters and length, then class
    pub fn from_apdu(apdu: &Apdu<'_>) -> Result<Self, StatusWord> {
        let request = match apdu.ins {
            ins::REGISTER => {
                if apdu.p2 != 0 {
                    return Err(StatusWord::WrongData);
                }
                if apdu.data.len() != 64 {
                    return Err(StatusWord::WrongLength);
                }
                Self::Register {
                    challenge: block(&apdu.data[..32]),
                    application: block(&apdu.data[32..64]),
                }
            }
            ins::AUTHENTICATE => {
                let control = ControlByte::from_u8(apdu.p1).ok_or(StatusWord::WrongData)?;
                if apdu.p2 != 0 {
                    return Err(StatusWord::WrongData);
                }
                let Some(&handle_len) = apdu.data.get(64) else {
                    return Err(StatusWord::WrongLength);
                };
                if apdu.data.len() != 65 + usize::from(handle_len) {
                    return Err(StatusWord::WrongLength);
                }
                Self::Authenticate {
                    control,
                    challenge: block(&apdu.data[..32]),
                    application: block(&apdu.data[32..64]),
                    key_handle: apdu.data[65..].to_vec(),
                }
            }
            ins::VERSION => {
                if apdu.p1 != 0 || apdu.p2 != 0 {
                    return Err(StatusWord::WrongData);
                }
                if !apdu.data.is_empty() {
                    return Err(StatusWord::WrongLength);
                }
                Self::Version
            }
            _ => return Err(StatusWord::InsNotSupported),
        };

        if apdu.cla != 0 {
            return Err(StatusWord::ClaNotSupported);
        }
        Ok(request)
    }
}

fn block(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

/// Which operation produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum U2fKind {
    Register,
    Authenticate,
    Version,
}

/// A successful U2F response, possibly held back until the user confirms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct U2fReply {
    pub kind: U2fKind,
    /// Response data without the status word
    pub data: Vec<u8>,
    /// Release `data` only after a presence prompt is accepted
    pub needs_presence: bool,
    /// Credential to delete if the presence prompt is refused
    pub rollback: Option<Vec<u8>>,
    /// Relying party shown in the presence prompt
    pub rp_id: Option<String>,
}

impl U2fReply {
    fn version() -> Self {
        Self {
            kind: U2fKind::Version,
            data: U2F_VERSION.to_vec(),
            needs_presence: false,
            rollback: None,
            rp_id: None,
        }
    }

    /// Response data followed by 9000
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&StatusWord::NoError.to_bytes());
        out
    }
}

/// Process one U2F request
pub fn handle_u2f<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    request: &[u8],
) -> Result<U2fReply, StatusWord> {
    if request == LEGACY_VERSION_PROBE {
        debug!("Legacy version probe");
        return Ok(U2fReply::version());
    }

    let apdu = Apdu::parse(request)?;
    match U2fRequest::from_apdu(&apdu)? {
        U2fRequest::Register {
            challenge,
            application,
        } => register(auth, &challenge, &application),
        U2fRequest::Authenticate {
            control,
            challenge,
            application,
            key_handle,
        } => authenticate(auth, control, &challenge, &application, &key_handle),
        U2fRequest::Version => Ok(U2fReply::version()),
    }
}

fn register<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    challenge: &[u8; 32],
    application: &[u8; 32],
) -> Result<U2fReply, StatusWord> {
    let is_probe = probe::is_probe_u2f(application, challenge);
    let (rp_id, app_id) = auth.config().known_facets.rp_ids_for(application);
    debug!(%rp_id, is_probe, "U2F register");

    let credential = auth
        .callbacks()
        .generate_credential(NewCredential {
            rp_id: rp_id.clone(),
            rp_name: Some(U2F_RP_NAME.to_string()),
            u2f_rp_id: Some(app_id),
            ..Default::default()
        })
        .map_err(|status| {
            warn!(%status, "Failed to create U2F credential");
            StatusWord::MemoryFailure
        })?;

    let data = registration_data(&credential, challenge, application);
    if is_probe || data.is_err() {
        discard(auth, &credential.id);
    }
    let data = data?;

    Ok(U2fReply {
        kind: U2fKind::Register,
        data,
        needs_presence: !is_probe,
        rollback: (!is_probe).then(|| credential.id.clone()),
        rp_id: Some(rp_id),
    })
}

fn registration_data(
    credential: &CredentialSource,
    challenge: &[u8; 32],
    application: &[u8; 32],
) -> Result<Vec<u8>, StatusWord> {
    let aborted = |_| StatusWord::CommandAborted;

    let public_key = credential.public_key().map_err(aborted)?;
    let handle_len = u8::try_from(credential.id.len()).map_err(|_| StatusWord::CommandAborted)?;
    let certificate =
        x509::self_signed_certificate(&credential.private_key, ATTESTATION_CN).map_err(|e| {
            warn!(error = %e, "Failed to build attestation certificate");
            StatusWord::CommandAborted
        })?;

    let mut signed = Vec::with_capacity(1 + 32 + 32 + credential.id.len() + public_key.len());
    signed.push(REGISTER_SIGN_PREFIX);
    signed.extend_from_slice(application);
    signed.extend_from_slice(challenge);
    signed.extend_from_slice(&credential.id);
    signed.extend_from_slice(&public_key);
    let signature =
        ecdsa::sign(&credential.private_key, &signed).map_err(|_| StatusWord::CommandAborted)?;

    let mut out = Vec::with_capacity(
        1 + public_key.len() + 1 + credential.id.len() + certificate.len() + signature.len(),
    );
    out.push(REGISTER_ID);
    out.extend_from_slice(&public_key);
    out.push(handle_len);
    out.extend_from_slice(&credential.id);
    out.extend_from_slice(&certificate);
    out.extend_from_slice(&signature);
    Ok(out)
}

fn authenticate<C: AuthenticatorCallbacks>(
    auth: &Authenticator<C>,
    control: ControlByte,
    challenge: &[u8; 32],
    application: &[u8; 32],
    key_handle: &[u8],
) -> Result<U2fReply, StatusWord> {
    let credential = auth
        .callbacks()
        .credential_by_id(key_handle)
        .map_err(|_| StatusWord::MemoryFailure)?
        .ok_or(StatusWord::WrongData)?;

    // A key handle is only valid for the application it was registered to
    let bound_to = auth_data::credential_rp_id_hash(&credential).map_err(|_| StatusWord::WrongData)?;
    if bound_to != *application {
        return Err(StatusWord::WrongData);
    }

    let needs_presence = match control {
        ControlByte::CheckOnly => return Err(StatusWord::ConditionsNotSatisfied),
        ControlByte::EnforcePresence => true,
        ControlByte::DontEnforcePresence => false,
    };
    debug!(rp_id = %credential.rp_id, ?control, "U2F authenticate");

    let assertion = sign_assertion(auth, &credential, challenge, false, false, Vec::new())
        .map_err(|status| {
            warn!(%status, "Failed to sign U2F assertion");
            StatusWord::MemoryFailure
        })?;

    // Flags and counter only; rpIdHash is implied by the application parameter
    let mut data = assertion.auth_data[32..auth_data::HEADER_LENGTH].to_vec();
    data.extend_from_slice(&assertion.signature);

    Ok(U2fReply {
        kind: U2fKind::Authenticate,
        data,
        needs_presence,
        rollback: None,
        rp_id: Some(credential.rp_id.clone()),
    })
}

fn discard<C: AuthenticatorCallbacks>(auth: &Authenticator<C>, credential_id: &[u8]) {
    if let Err(status) = auth.callbacks().delete_credential(credential_id) {
        warn!(%status, "Failed to delete U2F credential");
    }
}

impl<C: AuthenticatorCallbacks> Authenticator<C> {
    /// Process one U2F request (APDU)
    pub fn handle_u2f(&self, request: &[u8]) -> Result<U2fReply, StatusWord> {
        handle_u2f(self, request)
    }

    /// Raise the presence prompt guarding `reply`
    ///
    /// The prompt is not awaited; the caller polls it.
    pub fn u2f_presence_prompt(&self, reply: &U2fReply) -> PendingPrompt<bool> {
        let mut request = ConsentRequest::new(PromptKind::U2fPresence);
        if let Some(rp_id) = &reply.rp_id {
            request = request.with_rp(rp_id.clone(), Some(U2F_RP_NAME.to_string()));
        }
        self.callbacks().show_prompt(&request)
    }

    /// Undo whatever `reply` created after its presence prompt failed
    pub fn rollback_u2f(&self, reply: &U2fReply) {
        if let Some(credential_id) = &reply.rollback {
            info!("Rolling back U2F registration");
            discard(self, credential_id);
        }
    }
}
