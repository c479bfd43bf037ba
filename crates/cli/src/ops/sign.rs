use chrono::{DateTime, Utc};
use clap::Args;
use common::signing::{RequestDescriptor, SignError};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::state::{AppState, Session, StateError};

#[derive(Args, Debug, Clone)]
pub struct Sign {
    /// URL of the request to sign
    pub url: Url,

    /// HTTP method
    #[arg(long, default_value = "POST")]
    pub method: String,

    /// JSON request body
    #[arg(long, default_value = "{}")]
    pub body: String,

    /// Sign with the account key instead of the blob's auth secret
    #[arg(long)]
    pub ecdsa: bool,

    /// Account named in an ECDSA signature (defaults to the public key)
    #[arg(long)]
    pub account: Option<String>,

    /// Hex auth secret (defaults to the one in the logged-in blob)
    #[arg(long)]
    pub auth_secret: Option<String>,

    /// Blob id the signature is bound to (defaults to the logged-in account's)
    #[arg(long)]
    pub blob_id: Option<String>,

    /// Signature time, RFC 3339 (defaults to now)
    #[arg(long)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignCommandError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("signing failed: {0}")]
    Sign(#[from] SignError),
    #[error("invalid body: {0}")]
    Body(#[from] serde_json::Error),
    #[error("invalid method: {0}")]
    InvalidMethod(String),
    #[error("no blob id given and no account logged in")]
    MissingBlobId,
    #[error("no auth secret given and none in the logged-in blob")]
    MissingAuthSecret,
}

impl Sign {
    fn blob_id(&self, session: Option<&Session>) -> Result<String, SignCommandError> {
        if let Some(id) = &self.blob_id {
            return Ok(id.clone());
        }
        session
            .and_then(|s| s.keys.id())
            .map(str::to_string)
            .ok_or(SignCommandError::MissingBlobId)
    }

    fn auth_secret(&self, session: Option<&Session>) -> Result<String, SignCommandError> {
        if let Some(secret) = &self.auth_secret {
            return Ok(secret.clone());
        }
        session
            .and_then(|s| s.blob.as_ref())
            .and_then(|b| b.data.get("auth_secret"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(SignCommandError::MissingAuthSecret)
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Sign {
    type Error = SignCommandError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let method = Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|_| SignCommandError::InvalidMethod(self.method.clone()))?;
        let body: Value = serde_json::from_str(&self.body)?;
        let descriptor = RequestDescriptor::new(method, self.url.clone(), body);
        let timestamp = self.date.unwrap_or_else(Utc::now);

        let needs_session =
            self.blob_id.is_none() || (!self.ecdsa && self.auth_secret.is_none());
        let session = if needs_session {
            Some(AppState::load(ctx.config_path.clone())?.load_session()?)
        } else {
            None
        };
        let blob_id = self.blob_id(session.as_ref())?;

        let signed = if self.ecdsa {
            let key = AppState::load(ctx.config_path.clone())?.load_key()?;
            let account = self
                .account
                .clone()
                .unwrap_or_else(|| key.public().to_hex());
            descriptor.sign_asymmetric_at(&key, &account, &blob_id, timestamp)?
        } else {
            descriptor.sign_hmac_at(&self.auth_secret(session.as_ref())?, &blob_id, timestamp)?
        };

        Ok(signed.url.to_string())
    }
}
