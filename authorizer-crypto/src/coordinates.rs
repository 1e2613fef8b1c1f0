//! Fixed-width encoding of P-256 point coordinates
//!
//! COSE keys and the U2F wire format carry each coordinate as exactly 32
//! big-endian bytes. Values coming from signed big-integer encoders may be one
//! byte short (leading zero dropped) or one byte long (sign-extension byte), so
//! every coordinate crossing the wire goes through [`encode_coordinate`].

use crate::error::{CryptoError, Result};

use p256::PublicKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;

/// Size of a P-256 field element in bytes
pub const FIELD_SIZE: usize = 32;

/// Size of an uncompressed SEC1 point (0x04 || x || y)
pub const UNCOMPRESSED_POINT_SIZE: usize = 1 + 2 * FIELD_SIZE;

/// Normalize a big-endian coordinate to exactly 32 bytes
///
/// Shorter inputs are left-padded with zeros. Longer inputs are accepted only
/// when every surplus leading byte is zero.
///
/// # Examples
///
/// ```
/// use authorizer_crypto::coordinates::encode_coordinate;
///
/// let mut signed = vec![0x00];
/// signed.extend_from_slice(&[0xff; 32]);
/// assert_eq!(encode_coordinate(&signed).unwrap(), [0xff; 32]);
///
/// let short = [0x01u8; 31];
/// let encoded = encode_coordinate(&short).unwrap();
/// assert_eq!(encoded[0], 0x00);
/// assert_eq!(&encoded[1..], &short[..]);
/// ```
pub fn encode_coordinate(raw: &[u8]) -> Result<[u8; FIELD_SIZE]> {
    let mut out = [0u8; FIELD_SIZE];

    if raw.len() > FIELD_SIZE {
        let (surplus, value) = raw.split_at(raw.len() - FIELD_SIZE);
        if surplus.iter().any(|&b| b != 0) {
            return Err(CryptoError::InvalidCoordinate(raw.len()));
        }
        out.copy_from_slice(value);
    } else {
        out[FIELD_SIZE - raw.len()..].copy_from_slice(raw);
    }

    Ok(out)
}

/// Build the 65-byte uncompressed representation 0x04 || x || y
pub fn serialize_public_key(x: &[u8], y: &[u8]) -> Result<[u8; UNCOMPRESSED_POINT_SIZE]> {
    let mut out = [0u8; UNCOMPRESSED_POINT_SIZE];
    out[0] = 0x04;
    out[1..1 + FIELD_SIZE].copy_from_slice(&encode_coordinate(x)?);
    out[1 + FIELD_SIZE..].copy_from_slice(&encode_coordinate(y)?);
    Ok(out)
}

/// Split an uncompressed SEC1 public key into its coordinates
pub fn split_public_key(sec1: &[u8]) -> Result<([u8; FIELD_SIZE], [u8; FIELD_SIZE])> {
    let public = PublicKey::from_sec1_bytes(sec1).map_err(|_| CryptoError::InvalidPublicKey)?;
    let point = public.to_encoded_point(false);
    let x = point.x().ok_or(CryptoError::InvalidPublicKey)?;
    let y = point.y().ok_or(CryptoError::InvalidPublicKey)?;

    Ok((encode_coordinate(x)?, encode_coordinate(y)?))
}

/// Validate that (x, y) is a point on P-256 and return its SEC1 encoding
pub fn public_key_from_coordinates(x: &[u8], y: &[u8]) -> Result<[u8; UNCOMPRESSED_POINT_SIZE]> {
    let sec1 = serialize_public_key(x, y)?;
    PublicKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(sec1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdh::KeyPair;

    #[test]
    fn test_random_points_encode_to_fixed_width() {
        for _ in 0..64 {
            let keypair = KeyPair::generate();
            let (x, y) = split_public_key(&keypair.public_key_bytes()).unwrap();
            assert_eq!(x.len(), FIELD_SIZE);
            assert_eq!(y.len(), FIELD_SIZE);

            let decoded = public_key_from_coordinates(&x, &y).unwrap();
            assert_eq!(decoded.to_vec(), keypair.public_key_bytes());
        }
    }

    #[test]
    fn test_sign_extended_coordinate() {
        let mut raw = vec![0x00];
        raw.extend_from_slice(&[0x80; 32]);
        assert_eq!(encode_coordinate(&raw).unwrap(), [0x80; 32]);
    }

    #[test]
    fn test_short_coordinate_is_left_padded() {
        let raw = [0x7fu8; 31];
        let encoded = encode_coordinate(&raw).unwrap();
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..], &raw);

        assert_eq!(encode_coordinate(&[]).unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_oversized_coordinate_rejected() {
        let mut raw = vec![0x01];
        raw.extend_from_slice(&[0x00; 32]);
        assert_eq!(
            encode_coordinate(&raw),
            Err(CryptoError::InvalidCoordinate(33))
        );
    }

    #[test]
    fn test_serialize_public_key_layout() {
        let sec1 = serialize_public_key(&[0x11; 32], &[0x22; 31]).unwrap();
        assert_eq!(sec1[0], 0x04);
        assert_eq!(&sec1[1..33], &[0x11; 32]);
        assert_eq!(sec1[33], 0x00);
        assert_eq!(&sec1[34..], &[0x22; 31]);
    }

    #[test]
    fn test_point_not_on_curve() {
        assert_eq!(
            public_key_from_coordinates(&[0x01; 32], &[0x02; 32]),
            Err(CryptoError::InvalidPublicKey)
        );
    }
}
