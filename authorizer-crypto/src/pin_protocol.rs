//! PIN protocol one and the hash primitives it is built on
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#pinProto1>
//!
//! Protocol one encrypts with AES-256-CBC under a zero IV and no padding; all
//! plaintexts it carries (PIN hashes, padded PINs, tokens, salts) are already
//! whole blocks. Authentication tags are the leftmost 16 bytes of HMAC-SHA-256.

use crate::error::{CryptoError, Result};

use aes::Aes256;
use cbc::{
    Decryptor, Encryptor,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding},
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Length of a truncated authentication tag
pub const AUTH_TAG_SIZE: usize = 16;

/// SHA-256 digest of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Full HMAC-SHA-256 of `data` under `key`
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// PIN protocol version 1
pub mod v1 {
    use super::*;

    /// Encrypt block-aligned plaintext with AES-256-CBC under a zero IV
    ///
    /// # Examples
    ///
    /// ```
    /// use authorizer_crypto::pin_protocol::v1;
    ///
    /// let key = [0x42u8; 32];
    /// let pin_hash = [0x17u8; 16];
    ///
    /// let ciphertext = v1::encrypt(&key, &pin_hash).unwrap();
    /// assert_eq!(ciphertext.len(), 16);
    /// assert_eq!(v1::decrypt(&key, &ciphertext).unwrap(), pin_hash);
    /// ```
    pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        if !plaintext.len().is_multiple_of(BLOCK_SIZE) {
            return Err(CryptoError::EncryptionFailed);
        }

        let iv = [0u8; BLOCK_SIZE];
        let mut buffer = plaintext.to_vec();
        let len = buffer.len();

        let cipher = Aes256CbcEnc::new(key.into(), &iv.into());
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(buffer)
    }

    /// Decrypt block-aligned ciphertext with AES-256-CBC under a zero IV
    pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(BLOCK_SIZE) {
            return Err(CryptoError::DecryptionFailed);
        }

        let iv = [0u8; BLOCK_SIZE];
        let mut buffer = ciphertext.to_vec();

        let cipher = Aes256CbcDec::new(key.into(), &iv.into());
        cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok(buffer)
    }

    /// LEFT(HMAC-SHA-256(key, data), 16)
    pub fn authenticate(key: &[u8], data: &[u8]) -> [u8; AUTH_TAG_SIZE] {
        let full = hmac_sha256(key, data);
        let mut out = [0u8; AUTH_TAG_SIZE];
        out.copy_from_slice(&full[..AUTH_TAG_SIZE]);
        out
    }

    /// Constant-time check of a truncated tag
    ///
    /// Tags of the wrong length never verify.
    ///
    /// # Examples
    ///
    /// ```
    /// use authorizer_crypto::pin_protocol::v1;
    ///
    /// let key = [0x42u8; 32];
    /// let tag = v1::authenticate(&key, b"newPinEnc");
    /// assert!(v1::verify(&key, b"newPinEnc", &tag));
    /// assert!(!v1::verify(&key, b"other", &tag));
    /// assert!(!v1::verify(&key, b"newPinEnc", &tag[..15]));
    /// ```
    pub fn verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
        if tag.len() != AUTH_TAG_SIZE {
            return false;
        }
        authenticate(key, data)[..].ct_eq(tag).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_v1_encrypt_decrypt() {
        let key = [0x42u8; 32];
        let plaintext = [0xa5u8; 64];

        let ciphertext = v1::encrypt(&key, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);

        assert_eq!(v1::decrypt(&key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_v1_zero_iv_first_block_is_ecb() {
        use aes::cipher::{BlockEncrypt, KeyInit};

        let key = [0x01u8; 32];
        let block = [0x5au8; 16];

        let mut expected = aes::Block::clone_from_slice(&block);
        Aes256::new(&key.into()).encrypt_block(&mut expected);

        let ciphertext = v1::encrypt(&key, &block).unwrap();
        assert_eq!(&ciphertext[..], expected.as_slice());
    }

    #[test]
    fn test_v1_rejects_unaligned_input() {
        let key = [0x42u8; 32];
        assert_eq!(
            v1::encrypt(&key, b"not aligned"),
            Err(CryptoError::EncryptionFailed)
        );
        assert_eq!(
            v1::decrypt(&key, &[0u8; 17]),
            Err(CryptoError::DecryptionFailed)
        );
        assert_eq!(v1::decrypt(&key, &[]), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_v1_authenticate_is_truncated_hmac() {
        let key = [0x42u8; 32];
        let data = b"client_data_hash";

        let tag = v1::authenticate(&key, data);
        assert_eq!(&tag[..], &hmac_sha256(&key, data)[..16]);
        assert!(v1::verify(&key, data, &tag));
        assert!(!v1::verify(&key, b"wrong_data", &tag));
    }
}
