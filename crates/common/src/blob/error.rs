use reqwest::StatusCode;

use crate::client::TransportError;
use crate::crypto::EnvelopeError;
use crate::signing::SignError;

use super::store::BlobState;

/// Errors from applying a single patch to a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("invalid pointer '{pointer}': {reason}")]
    InvalidPointer { pointer: String, reason: String },
    #[error("operator '{op}' cannot be applied to the value at '{pointer}'")]
    TargetTypeMismatch { op: String, pointer: String },
    #[error("malformed patch: {0}")]
    Malformed(String),
}

impl PatchError {
    pub(crate) fn invalid_pointer(pointer: &str, reason: impl Into<String>) -> Self {
        PatchError::InvalidPointer {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("sign error: {0}")]
    Sign(#[from] SignError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("account is locked")]
    AccountLocked,
    #[error("blob is {0:?}, not ready for this operation")]
    InvalidState(BlobState),
    #[error("no decryption key for the blob")]
    MissingKey,
    #[error("blob has no auth_secret to sign requests with")]
    MissingAuthSecret,
    #[error("blob has no encrypted secret")]
    MissingEncryptedSecret,
    #[error("decrypted blob is not a JSON object")]
    MalformedDocument,
    #[error("cannot {0} the identity vault")]
    IdentityVaultProtected(&'static str),
    #[error("revision conflict: {0}")]
    RevisionConflict(String),
    #[error("vault returned HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}
