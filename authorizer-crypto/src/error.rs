use thiserror::Error;

/// Why a key, signature or PIN protocol operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Not an uncompressed SEC1 point on P-256
    #[error("Invalid public key")]
    InvalidPublicKey,
    /// Zero or not below the curve order
    #[error("Invalid private key")]
    InvalidPrivateKey,
    /// Malformed DER, or the signature does not verify
    #[error("Invalid signature")]
    InvalidSignature,
    /// Ciphertext is not a whole number of AES blocks
    #[error("Decryption failed")]
    DecryptionFailed,
    /// Plaintext is not a whole number of AES blocks
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    /// A point coordinate does not fit in a field element
    #[error("Coordinate of {0} bytes does not fit P-256")]
    InvalidCoordinate(usize),
    #[error("ECDH key agreement failed")]
    KeyAgreementFailed,
    #[error("Certificate encoding failed")]
    CertificateEncoding,
}

pub type Result<T> = core::result::Result<T, CryptoError>;
