//! Versioned AES-256-CCM envelopes
//!
//! Wire format (base64, standard alphabet):
//!
//! ```text
//! [version: 1 byte = 0x00][iv: 16 bytes][ciphertext || tag (8 bytes)]
//! ```
//!
//! The CCM nonce is the first `15 - L` bytes of the IV, where `L` is the size of
//! the CCM length field: the smallest value in `2..=4` that can hold the
//! plaintext length. This matches the SJCL convention used by the vault's
//! browser clients, so envelopes are interchangeable between them.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit};
use ccm::consts::{U11, U12, U13, U8};
use ccm::Ccm;

use super::secret::Secret;

/// The only envelope version defined so far
pub const ENVELOPE_VERSION: u8 = 0;
/// Size of the stored IV in bytes (128 bits)
pub const IV_SIZE: usize = 16;
/// Size of the CCM authentication tag in bytes (64 bits)
pub const TAG_SIZE: usize = 8;

type Aes256Ccm13 = Ccm<Aes256, U8, U13>;
type Aes256Ccm12 = Ccm<Aes256, U8, U12>;
type Aes256Ccm11 = Ccm<Aes256, U8, U11>;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid base64")]
    InvalidBase64,
    #[error("envelope is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("payload too large for a CCM envelope ({0} bytes)")]
    PayloadTooLarge(usize),
    #[error("failed to generate iv: {0}")]
    Random(String),
}

/// Size of the CCM length field for a message of `len` bytes
fn length_field_size(len: usize) -> Result<usize, EnvelopeError> {
    let len = len as u64;
    match len {
        l if l < 1 << 16 => Ok(2),
        l if l < 1 << 24 => Ok(3),
        l if l < 1 << 32 => Ok(4),
        _ => Err(EnvelopeError::PayloadTooLarge(len as usize)),
    }
}

/// Encrypt `plaintext` under `key` into a base64 envelope.
///
/// A fresh random IV is drawn for every call.
pub fn encrypt(key: &Secret, plaintext: &[u8]) -> Result<String, EnvelopeError> {
    let mut iv = [0u8; IV_SIZE];
    getrandom::getrandom(&mut iv).map_err(|e| EnvelopeError::Random(e.to_string()))?;

    let ciphertext = seal(key, &iv, plaintext)?;

    let mut out = Vec::with_capacity(1 + IV_SIZE + ciphertext.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(out))
}

/// Decrypt a base64 envelope produced by [`encrypt`].
///
/// # Errors
///
/// - [`EnvelopeError::UnsupportedVersion`] if the version byte is not 0
/// - [`EnvelopeError::DecryptionFailed`] on a wrong key or tampered ciphertext;
///   no plaintext is returned in that case
pub fn decrypt(key: &Secret, sealed: &str) -> Result<Vec<u8>, EnvelopeError> {
    let raw = STANDARD
        .decode(sealed.trim())
        .map_err(|_| EnvelopeError::InvalidBase64)?;

    let Some(&version) = raw.first() else {
        return Err(EnvelopeError::Truncated(0));
    };
    if version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }
    if raw.len() < 1 + IV_SIZE + TAG_SIZE {
        return Err(EnvelopeError::Truncated(raw.len()));
    }

    let iv = &raw[1..1 + IV_SIZE];
    let ciphertext = &raw[1 + IV_SIZE..];
    open(key, iv, ciphertext)
}

fn seal(key: &Secret, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let nonce_len = 15 - length_field_size(plaintext.len())?;
    let nonce = &iv[..nonce_len];
    let sealed = match nonce_len {
        13 => Aes256Ccm13::new(GenericArray::from_slice(key.bytes()))
            .encrypt(GenericArray::from_slice(nonce), plaintext),
        12 => Aes256Ccm12::new(GenericArray::from_slice(key.bytes()))
            .encrypt(GenericArray::from_slice(nonce), plaintext),
        _ => Aes256Ccm11::new(GenericArray::from_slice(key.bytes()))
            .encrypt(GenericArray::from_slice(nonce), plaintext),
    };
    sealed.map_err(|_| EnvelopeError::EncryptionFailed)
}

fn open(key: &Secret, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let nonce_len = 15 - length_field_size(ciphertext.len() - TAG_SIZE)?;
    let nonce = &iv[..nonce_len];
    let opened = match nonce_len {
        13 => Aes256Ccm13::new(GenericArray::from_slice(key.bytes()))
            .decrypt(GenericArray::from_slice(nonce), ciphertext),
        12 => Aes256Ccm12::new(GenericArray::from_slice(key.bytes()))
            .decrypt(GenericArray::from_slice(nonce), ciphertext),
        _ => Aes256Ccm11::new(GenericArray::from_slice(key.bytes()))
            .decrypt(GenericArray::from_slice(nonce), ciphertext),
    };
    opened.map_err(|_| EnvelopeError::DecryptionFailed)
}

#[cfg(test)]
mod test {
    use super::*;

    fn key() -> Secret {
        Secret::generate().unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = key();
        let data = b"hello world, this is a test message for encryption";

        let sealed = encrypt(&key, data).unwrap();
        let opened = decrypt(&key, &sealed).unwrap();

        assert_eq!(data.as_slice(), opened.as_slice());
    }

    #[test]
    fn test_envelope_layout() {
        let key = key();
        let sealed = encrypt(&key, b"abc").unwrap();
        let raw = STANDARD.decode(sealed).unwrap();

        assert_eq!(raw[0], ENVELOPE_VERSION);
        assert_eq!(raw.len(), 1 + IV_SIZE + 3 + TAG_SIZE);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = key();
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_payload() {
        let key = key();
        let sealed = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_large_payload_uses_wider_length_field() {
        let key = key();
        let data = vec![0x5a; (1 << 16) + 10];
        let sealed = encrypt(&key, &data).unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), data);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&key(), b"secret").unwrap();
        assert!(matches!(
            decrypt(&key(), &sealed),
            Err(EnvelopeError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_flipped_tag_byte_fails() {
        let key = key();
        let sealed = encrypt(&key, b"tamper with me").unwrap();
        let mut raw = STANDARD.decode(sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let result = decrypt(&key, &STANDARD.encode(raw));
        assert!(matches!(result, Err(EnvelopeError::DecryptionFailed)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let key = key();
        let sealed = encrypt(&key, b"data").unwrap();
        let mut raw = STANDARD.decode(sealed).unwrap();
        raw[0] = 1;

        let result = decrypt(&key, &STANDARD.encode(raw));
        assert!(matches!(result, Err(EnvelopeError::UnsupportedVersion(1))));
    }

    #[test]
    fn test_truncated_and_garbage_input() {
        let key = key();
        assert!(matches!(
            decrypt(&key, "not base64!"),
            Err(EnvelopeError::InvalidBase64)
        ));
        assert!(matches!(
            decrypt(&key, &STANDARD.encode([0u8; 10])),
            Err(EnvelopeError::Truncated(10))
        ));
        assert!(matches!(decrypt(&key, ""), Err(EnvelopeError::Truncated(0))));
    }

    #[test]
    fn test_length_field_size() {
        assert_eq!(length_field_size(0).unwrap(), 2);
        assert_eq!(length_field_size(65_535).unwrap(), 2);
        assert_eq!(length_field_size(65_536).unwrap(), 3);
        assert_eq!(length_field_size((1 << 24) - 1).unwrap(), 3);
        assert_eq!(length_field_size(1 << 24).unwrap(), 4);
    }
}
