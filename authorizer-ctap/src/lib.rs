//! CTAP2 and U2F authenticator core
//!
//! This crate provides the command handling of a FIDO authenticator: CTAP 2.0
//! requests (makeCredential, getAssertion, clientPIN, ...) and U2F raw
//! messages. The host supplies its UI and credential storage through the
//! traits in [`callbacks`]; the transport lives elsewhere.
//!
//! Implements the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html>

pub mod apdu;
pub mod attestation;
pub mod auth_data;
pub mod authenticator;
pub mod callbacks;
pub mod cbor;
pub mod commands;
pub mod dispatcher;
pub mod extensions;
pub mod facets;
pub mod memory;
pub mod pin_locker;
pub mod probe;
pub mod prompt;
pub mod scripted;
pub mod session;
pub mod status;
pub mod types;
pub mod u2f;

// Re-export commonly used types
pub use apdu::StatusWord;
pub use authenticator::{Authenticator, AuthenticatorConfig, CancelToken, InternalStatus};
pub use callbacks::{
    AuthenticatorCallbacks, CallbackSet, ConsentRequest, CredentialSafe, PromptKind,
    UserInteraction,
};
pub use facets::{Facet, KnownFacets};
pub use memory::MemoryCredentialSafe;
pub use pin_locker::{MemoryPinStore, PinState, PinStore};
pub use prompt::{Outcome, PendingPrompt, Prompt};
pub use scripted::{Answer, ScriptedInteraction, TestCallbacks};
pub use status::{Result, StatusCode};
pub use types::{
    CredentialSource, NewCredential, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, RelyingParty, User,
};
pub use u2f::{U2fKind, U2fReply};
