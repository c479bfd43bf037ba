use serde::{Deserialize, Serialize};

use crate::crypto::PakdfParams;

/// Auth info packet version this client understands
pub const AUTH_INFO_VERSION: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum AuthInfoError {
    #[error("auth info version {0} is incompatible with this client")]
    IncompatibleVersion(u32),
    #[error("no blobvault specified in the auth info")]
    MissingBlobvault,
}

/// What the vault publishes about a username: whether it exists, where its
/// blob lives, and the PAKDF parameters to derive its keys with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    pub username: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub blobvault: String,
    pub pakdf: PakdfParams,
}

impl AuthInfo {
    /// Reject packets this client cannot use
    pub fn validate(&self) -> Result<(), AuthInfoError> {
        if self.version != AUTH_INFO_VERSION {
            return Err(AuthInfoError::IncompatibleVersion(self.version));
        }
        if self.blobvault.trim().is_empty() {
            return Err(AuthInfoError::MissingBlobvault);
        }
        Ok(())
    }
}

/// Lowercase and strip `-`, the form usernames take inside key derivation
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase().replace('-', "")
}
