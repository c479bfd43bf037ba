use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a secp256k1 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of a compressed SEC1 secp256k1 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 33;
/// Size of a recoverable signature: `r || s || recovery id`
pub const RECOVERABLE_SIGNATURE_SIZE: usize = 65;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("signature error: {0}")]
    Signature(#[from] k256::ecdsa::Error),
}

/// Public half of an account signing key
///
/// Serialized as the compressed SEC1 point in hex.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key)
    }
}

impl PublicKey {
    /// Parse a public key from a hex encoded SEC1 point (compressed or not)
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes =
            hex::decode(hex).map_err(|_| anyhow::anyhow!("public key hex decode error"))?;
        Ok(Self(VerifyingKey::from_sec1_bytes(&bytes)?))
    }

    /// Compressed SEC1 encoding
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.0.to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Lowercase hex of the compressed point
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Recover the key that produced a 65-byte recoverable signature over `prehash`
    pub fn recover(prehash: &[u8], signature: &[u8]) -> Result<Self, KeyError> {
        if signature.len() != RECOVERABLE_SIGNATURE_SIZE {
            return Err(anyhow::anyhow!(
                "invalid recoverable signature size, expected {}, got {}",
                RECOVERABLE_SIGNATURE_SIZE,
                signature.len()
            )
            .into());
        }
        let sig = Signature::from_slice(&signature[..64])?;
        let recid = RecoveryId::from_byte(signature[64])
            .ok_or_else(|| anyhow::anyhow!("invalid recovery id {}", signature[64]))?;
        Ok(Self(VerifyingKey::recover_from_prehash(prehash, &sig, recid)?))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Account signing key used for asymmetric request signatures
///
/// # Examples
///
/// ```ignore
/// let secret_key = SecretKey::generate()?;
/// let pem = secret_key.to_pem();
/// std::fs::write("account.pem", pem)?;
///
/// let pem = std::fs::read_to_string("account.pem")?;
/// let recovered = SecretKey::from_pem(&pem)?;
/// assert_eq!(secret_key.public(), recovered.public());
/// ```
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public()).finish()
    }
}

impl SecretKey {
    /// Build a key from its 32-byte scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        Ok(Self(SigningKey::from_slice(bytes)?))
    }

    /// Parse a secret key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("private key hex decode error"))?;
        Self::from_bytes(&buff)
    }

    /// Generate a new random secret key using the operating system RNG
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        loop {
            getrandom::getrandom(&mut bytes)
                .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {e}"))?;
            // out-of-range scalars are vanishingly rare, draw again
            if let Ok(key) = SigningKey::from_slice(&bytes) {
                return Ok(Self(key));
            }
        }
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes().into()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Encode secret key in PEM format for storage
    ///
    /// Returns a PEM-encoded string with tag "PRIVATE KEY".
    pub fn to_pem(&self) -> String {
        let pem = pem::Pem::new("PRIVATE KEY", self.to_bytes());
        pem::encode(&pem)
    }

    /// Parse a secret key from PEM format
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The PEM string is malformed
    /// - The PEM tag is not "PRIVATE KEY"
    /// - The key size is incorrect
    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let pem = pem::parse(pem_str).map_err(|e| anyhow::anyhow!("failed to parse PEM: {}", e))?;

        if pem.tag() != "PRIVATE KEY" {
            return Err(anyhow::anyhow!("invalid PEM tag, expected PRIVATE KEY").into());
        }

        let contents = pem.contents();
        if contents.len() != PRIVATE_KEY_SIZE {
            return Err(anyhow::anyhow!(
                "invalid private key size in PEM, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                contents.len()
            )
            .into());
        }
        Self::from_bytes(contents)
    }

    /// Sign a 32-byte message digest, returning `r || s || recovery id`
    pub fn sign_recoverable(
        &self,
        prehash: &[u8],
    ) -> Result<[u8; RECOVERABLE_SIGNATURE_SIZE], KeyError> {
        let (signature, recid) = self.0.sign_prehash_recoverable(prehash)?;
        let mut out = [0u8; RECOVERABLE_SIGNATURE_SIZE];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recid.to_byte();
        Ok(out)
    }
}
