//! Cryptographic primitives for the authorizer FIDO2/U2F authenticator
//!
//! This crate provides the operations the authenticator core needs:
//!
//! - **ECDH**: P-256 key agreement for the PIN protocol and `hmac-secret`
//! - **ECDSA**: ES256 signatures for attestation, assertions and U2F
//! - **PIN protocol one**: AES-256-CBC (zero IV, no padding) and truncated HMAC-SHA-256
//! - **Coordinates**: fixed-width encoding of P-256 point coordinates
//! - **X.509**: the self-signed certificate carried in U2F registration responses
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html>

pub mod coordinates;
pub mod ecdh;
pub mod ecdsa;
pub mod error;
pub mod pin_protocol;
pub mod x509;

pub use error::{CryptoError, Result};
pub use pin_protocol::{hmac_sha256, sha256};
