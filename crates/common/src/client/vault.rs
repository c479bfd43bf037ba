use std::sync::Arc;

use reqwest::StatusCode;
use url::Url;

use crate::auth_info::{AuthInfo, AuthInfoError};
use crate::blob::{Blob, BlobEnvelope, BlobError, InitReport};
use crate::custom_keys::CustomKeys;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("auth info error: {0}")]
    AuthInfo(#[from] AuthInfoError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("unexpected response: {0}")]
    MalformedResponse(String),
    #[error("keys have not been derived for this account")]
    NotLoggedIn,
    #[error("vault returned HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

/// A blob as served by `GET /v1/blob/{id}`, with the refreshed login token
#[derive(Debug, Clone)]
pub struct FetchedBlob {
    pub envelope: BlobEnvelope,
    pub login_token: Option<String>,
}

/// Client for the blob vault's account endpoints
#[derive(Clone)]
pub struct VaultClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient").finish_non_exhaustive()
    }
}

fn check(response: HttpResponse) -> Result<HttpResponse, VaultError> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(VaultError::HttpStatus(response.status, response.message()))
    }
}

impl VaultClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Fetch and validate the auth info published for `username`
    pub async fn fetch_auth_info(
        &self,
        auth_info_url: &Url,
        username: &str,
    ) -> Result<AuthInfo, VaultError> {
        let mut url = auth_info_url.clone();
        url.query_pairs_mut().append_pair("username", username);

        let response = check(self.transport.send(HttpRequest::get(url)).await?)?;
        let auth_info: AuthInfo = serde_json::from_value(response.json)
            .map_err(|e| VaultError::MalformedResponse(e.to_string()))?;
        auth_info.validate()?;

        tracing::debug!(
            username = %auth_info.username,
            exists = auth_info.exists,
            "fetched auth info"
        );
        Ok(auth_info)
    }

    /// Fetch the encrypted blob `blob_id` with a login token
    pub async fn get_blob(
        &self,
        vault_url: &str,
        login_token: &str,
        blob_id: &str,
    ) -> Result<FetchedBlob, VaultError> {
        let url = Url::parse(&format!(
            "{}/v1/blob/{blob_id}",
            vault_url.trim_end_matches('/')
        ))?;
        let response = self
            .transport
            .send(HttpRequest::get(url).with_bearer(login_token))
            .await?;
        let response = check(response)?;
        let login_token = response.bearer_token();

        let envelope: BlobEnvelope = serde_json::from_value(response.json)
            .map_err(|e| VaultError::MalformedResponse(e.to_string()))?;
        Ok(FetchedBlob {
            envelope,
            login_token,
        })
    }

    /// Fetch the account's blob and decrypt it with the derived keys
    pub async fn open_blob(
        &self,
        keys: &CustomKeys,
        login_token: &str,
    ) -> Result<(Blob, InitReport, Option<String>), VaultError> {
        let (Some(id), Some(crypt)) = (keys.id(), keys.crypt()) else {
            return Err(VaultError::NotLoggedIn);
        };
        let vault_url = &keys.auth_info().blobvault;

        let fetched = self.get_blob(vault_url, login_token, id).await?;
        let blob = Blob::new(vault_url, id, crypt.clone(), self.transport.clone());
        let report = blob.init(fetched.envelope).await?;
        Ok((blob, report, fetched.login_token))
    }
}
