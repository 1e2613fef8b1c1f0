//! CTAP2 status codes
//!
//! <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#error-responses>

use authorizer_crypto::CryptoError;

use thiserror::Error;

/// Outcome of a CTAP2 command
///
/// Every command fails with exactly one of these; the dispatcher writes it
/// as the first byte of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u8)]
pub enum StatusCode {
    #[error("Success")]
    Success = 0x00,
    #[error("Invalid command")]
    InvalidCommand = 0x01,
    #[error("Invalid parameter")]
    InvalidParameter = 0x02,
    #[error("Invalid length")]
    InvalidLength = 0x03,
    #[error("CBOR unexpected type")]
    CborUnexpectedType = 0x11,
    #[error("Invalid CBOR")]
    InvalidCbor = 0x12,
    #[error("Missing parameter")]
    MissingParameter = 0x14,
    #[error("Limit exceeded")]
    LimitExceeded = 0x15,
    #[error("Unsupported extension")]
    UnsupportedExtension = 0x16,
    /// An exclude list entry is already registered here
    #[error("Credential excluded")]
    CredentialExcluded = 0x19,
    #[error("Invalid credential")]
    InvalidCredential = 0x22,
    #[error("Unsupported algorithm")]
    UnsupportedAlgorithm = 0x26,
    /// The user said no, or never answered
    #[error("Operation denied")]
    OperationDenied = 0x27,
    #[error("Key store full")]
    KeyStoreFull = 0x28,
    #[error("Unsupported option")]
    UnsupportedOption = 0x2B,
    #[error("Invalid option")]
    InvalidOption = 0x2C,
    /// Sent in place of the real response after CTAPHID_CANCEL
    #[error("Keepalive cancel")]
    KeepaliveCancel = 0x2D,
    #[error("No credentials")]
    NoCredentials = 0x2E,
    #[error("User action timeout")]
    UserActionTimeout = 0x2F,
    #[error("Not allowed")]
    NotAllowed = 0x30,
    #[error("PIN invalid")]
    PinInvalid = 0x31,
    #[error("PIN blocked")]
    PinBlocked = 0x32,
    #[error("PIN auth invalid")]
    PinAuthInvalid = 0x33,
    /// Cleared by power cycling, i.e. restarting the authenticator
    #[error("PIN auth blocked")]
    PinAuthBlocked = 0x34,
    #[error("PIN not set")]
    PinNotSet = 0x35,
    #[error("PIN required")]
    PinRequired = 0x36,
    #[error("PIN policy violation")]
    PinPolicyViolation = 0x37,
    #[error("PIN token expired")]
    PinTokenExpired = 0x38,
    #[error("Request too large")]
    RequestTooLarge = 0x39,
    #[error("Other error")]
    Other = 0x7F,
}

impl StatusCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl From<CryptoError> for StatusCode {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPublicKey
            | CryptoError::InvalidCoordinate(_)
            | CryptoError::InvalidKeyLength { .. } => Self::InvalidParameter,
            // A pinHashEnc that does not decrypt was made with the wrong secret
            CryptoError::DecryptionFailed => Self::PinAuthInvalid,
            CryptoError::InvalidPrivateKey
            | CryptoError::InvalidSignature
            | CryptoError::EncryptionFailed
            | CryptoError::KeyAgreementFailed
            | CryptoError::CertificateEncoding => Self::Other,
        }
    }
}

/// Result type for CTAP operations
pub type Result<T> = core::result::Result<T, StatusCode>;
