//! 256-bit symmetric keys
//!
//! Every symmetric key the vault handles (the blob `crypt` key, the `unlock`
//! key, recovery keys) is a `Secret`. On the wire and in persisted key bundles
//! a secret is a lowercase hex string, which is how the vault's other clients
//! exchange them.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::{self, EnvelopeError};

/// Size of an AES-256 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// Errors that can occur while constructing a secret
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("invalid secret size, expected {SECRET_SIZE}, got {0}")]
    InvalidSize(usize),
    #[error("secret hex decode error")]
    InvalidHex,
    #[error("failed to gather randomness: {0}")]
    Random(String),
}

/// A 256-bit symmetric key
///
/// The key bytes are wiped when the value is dropped, and `Debug` never prints them.
///
/// # Examples
///
/// ```ignore
/// let secret = Secret::generate()?;
/// let sealed = secret.encrypt(b"sensitive data")?;
/// let opened = secret.decrypt(&sealed)?;
/// assert_eq!(opened, b"sensitive data");
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_SIZE]);

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl Secret {
    /// Generate a new random secret using the operating system RNG
    pub fn generate() -> Result<Self, SecretError> {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).map_err(|e| SecretError::Random(e.to_string()))?;
        Ok(Self(buff))
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(SecretError::InvalidSize(data.len()));
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Parse a secret from a hex string, with or without a `0x` prefix
    pub fn from_hex(hex: &str) -> Result<Self, SecretError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.len() != SECRET_SIZE * 2 {
            return Err(SecretError::InvalidSize(hex.len() / 2));
        }
        let mut buff = [0; SECRET_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| SecretError::InvalidHex)?;
        Ok(buff.into())
    }

    /// Lowercase hex encoding of the key bytes
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Seal `data` into a version 0 envelope (base64 text)
    pub fn encrypt(&self, data: &[u8]) -> Result<String, EnvelopeError> {
        envelope::encrypt(self, data)
    }

    /// Open a version 0 envelope produced by [`Secret::encrypt`]
    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, EnvelopeError> {
        envelope::decrypt(self, sealed)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Secret::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}
