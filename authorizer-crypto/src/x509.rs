//! Minimal DER writer for the self-signed attestation certificate
//!
//! U2F registration responses carry an X.509 certificate whose key signed the
//! registration. The authenticator signs with the credential key itself, so the
//! certificate is self-signed over that key with a fixed validity window.

use crate::ecdsa::PreparedSigner;
use crate::error::{CryptoError, Result};

use rand::RngCore;
use rand::rngs::OsRng;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_EXPLICIT_0: u8 = 0xa0;

/// 1.2.840.10045.4.3.2
const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
/// 1.2.840.10045.2.1
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// 1.2.840.10045.3.1.7
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
/// 2.5.4.3
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

const NOT_BEFORE: &[u8] = b"200101000000Z";
const NOT_AFTER: &[u8] = b"491231235959Z";

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    match len {
        0..=0x7f => out.push(len as u8),
        0x80..=0xff => out.extend_from_slice(&[0x81, len as u8]),
        0x100..=0xffff => {
            out.push(0x82);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => return Err(CryptoError::CertificateEncoding),
    }
    Ok(())
}

fn tlv(tag: u8, value: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(value.len() + 4);
    out.push(tag);
    write_len(&mut out, value.len())?;
    out.extend_from_slice(value);
    Ok(out)
}

fn constructed(tag: u8, parts: &[&[u8]]) -> Result<Vec<u8>> {
    tlv(tag, &parts.concat())
}

/// Unused-bits octet followed by the payload
fn bit_string(payload: &[u8]) -> Result<Vec<u8>> {
    let mut value = Vec::with_capacity(payload.len() + 1);
    value.push(0x00);
    value.extend_from_slice(payload);
    tlv(TAG_BIT_STRING, &value)
}

fn random_serial() -> Result<Vec<u8>> {
    let mut serial = [0u8; 8];
    OsRng.fill_bytes(&mut serial);
    // Positive and minimally encoded
    serial[0] &= 0x7f;
    serial[0] |= 0x01;
    tlv(TAG_INTEGER, &serial)
}

fn name(common_name: &str) -> Result<Vec<u8>> {
    let attribute = constructed(
        TAG_SEQUENCE,
        &[
            &tlv(TAG_OID, OID_COMMON_NAME)?,
            &tlv(TAG_UTF8_STRING, common_name.as_bytes())?,
        ],
    )?;
    let rdn = tlv(TAG_SET, &attribute)?;
    tlv(TAG_SEQUENCE, &rdn)
}

/// Build a DER certificate for the key, signed by that same key
///
/// # Examples
///
/// ```
/// use authorizer_crypto::{ecdsa, x509};
///
/// let (private_key, _) = ecdsa::generate_keypair();
/// let cert = x509::self_signed_certificate(&private_key, "U2F Authenticator").unwrap();
/// assert_eq!(cert[0], 0x30);
/// ```
pub fn self_signed_certificate(private_key: &[u8; 32], common_name: &str) -> Result<Vec<u8>> {
    let signer = PreparedSigner::new(private_key)?;

    let version = tlv(TAG_EXPLICIT_0, &tlv(TAG_INTEGER, &[0x02])?)?;
    let algorithm = constructed(TAG_SEQUENCE, &[&tlv(TAG_OID, OID_ECDSA_WITH_SHA256)?])?;
    let subject = name(common_name)?;
    let validity = constructed(
        TAG_SEQUENCE,
        &[&tlv(TAG_UTC_TIME, NOT_BEFORE)?, &tlv(TAG_UTC_TIME, NOT_AFTER)?],
    )?;
    let key_algorithm = constructed(
        TAG_SEQUENCE,
        &[&tlv(TAG_OID, OID_EC_PUBLIC_KEY)?, &tlv(TAG_OID, OID_PRIME256V1)?],
    )?;
    let spki = constructed(
        TAG_SEQUENCE,
        &[&key_algorithm, &bit_string(&signer.public_key())?],
    )?;

    let tbs = constructed(
        TAG_SEQUENCE,
        &[
            &version,
            &random_serial()?,
            &algorithm,
            &subject,
            &validity,
            &subject,
            &spki,
        ],
    )?;

    let signature = signer.sign(&tbs)?;
    constructed(TAG_SEQUENCE, &[&tbs, &algorithm, &bit_string(&signature)?])
}
