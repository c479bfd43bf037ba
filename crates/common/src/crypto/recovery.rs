//! Account recovery keys
//!
//! A recovery key is derived from the account secret alone, so a user who
//! forgot their password but still holds the secret can unwrap the blob's
//! `crypt` key.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512};

use super::envelope::EnvelopeError;
use super::secret::{Secret, SecretError};

const RECOVERY_TAG: &[u8] = b"ripple/hmac/recovery_encryption_key/v1";

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("recovered key is invalid: {0}")]
    Secret(#[from] SecretError),
    #[error("recovered key is not utf-8 hex")]
    InvalidKeyEncoding,
}

/// `HMAC-SHA512(SHA512(secret)[0..16], RECOVERY_TAG)[0..32]`
pub fn derive_recovery_key(secret: &str) -> Secret {
    let hash = Sha512::digest(secret.as_bytes());
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(&hash[..16])
        .expect("HMAC accepts keys of any length");
    mac.update(RECOVERY_TAG);
    let out = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    key.copy_from_slice(&out[..32]);
    Secret::from(key)
}

/// Seal a blob's `crypt` key (as hex) under the recovery key for `secret`
pub fn wrap_blob_key(secret: &str, crypt: &Secret) -> Result<String, RecoveryError> {
    let recovery = derive_recovery_key(secret);
    Ok(recovery.encrypt(crypt.to_hex().as_bytes())?)
}

/// Inverse of [`wrap_blob_key`]
pub fn unwrap_blob_key(secret: &str, wrapped: &str) -> Result<Secret, RecoveryError> {
    let recovery = derive_recovery_key(secret);
    let hex = recovery.decrypt(wrapped)?;
    let hex = std::str::from_utf8(&hex).map_err(|_| RecoveryError::InvalidKeyEncoding)?;
    Ok(Secret::from_hex(hex)?)
}
