use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use crate::client::{HttpResponse, Transport};
use crate::crypto::Secret;
use crate::signing::{patch_body, RequestDescriptor, SignedRequest};

use super::apply::apply;
use super::error::BlobError;
use super::ops::Op;
use super::patch::{Patch, Subcommand};

/// Reserved top-level key that generic operations may not replace or remove
pub const IDENTITY_VAULT_KEY: &str = "identityVault";

/// Lifecycle of a [`Blob`].
///
/// `Mutating` and `Consolidating` mark the critical section of an update or
/// a consolidation. They are only ever set while the document lock is held
/// and are reset before it is released, so [`Blob::state`] never reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobState {
    Uninitialized,
    Decrypted,
    Mutating,
    Consolidating,
    Destroyed,
}

/// The blob as the vault serves it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobEnvelope {
    /// Encrypted document snapshot
    #[serde(default)]
    pub blob: String,
    /// Encrypted patches applied on top of the snapshot, oldest first
    #[serde(default)]
    pub patches: Vec<String>,
    #[serde(default)]
    pub locked: bool,
    /// Revision of the snapshot
    #[serde(default)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_secret: Option<String>,
}

/// Outcome of [`Blob::init`]
#[derive(Debug)]
pub struct InitReport {
    pub applied: usize,
    pub failed: usize,
    /// Background consolidation started after a clean replay
    pub consolidation: Option<JoinHandle<bool>>,
}

impl InitReport {
    /// Wait for the background consolidation, if one was started.
    /// Returns whether the vault accepted it.
    pub async fn consolidated(self) -> bool {
        match self.consolidation {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        }
    }
}

/// Everything needed to restore a decrypted blob without the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobSnapshot {
    pub id: String,
    pub url: String,
    pub key: Secret,
    pub revision: u64,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlobInner {
    // blob id on the vault, also the signature_blob_id
    pub id: String,
    // vault base url
    pub url: String,
    // the blob key (`crypt`); dropped on decryption failure and on destroy
    pub key: Option<Secret>,
    // revision of `data`
    pub revision: u64,
    // the decrypted document
    pub data: Value,
    pub state: BlobState,
    // the account secret sealed under the unlock key
    pub encrypted_secret: Option<String>,
}

impl BlobInner {
    /// Entry check for public operations on a decrypted blob
    fn ready(&self) -> Result<&Secret, BlobError> {
        if self.state != BlobState::Decrypted {
            return Err(BlobError::InvalidState(self.state));
        }
        self.key()
    }

    fn key(&self) -> Result<&Secret, BlobError> {
        self.key.as_ref().ok_or(BlobError::MissingKey)
    }

    /// `identityVault` may be created but never replaced or removed
    fn guard_identity_vault(&self, patch: &Patch) -> Result<(), BlobError> {
        if patch.pointer.strip_prefix('/') != Some(IDENTITY_VAULT_KEY) {
            return Ok(());
        }
        match patch.op {
            Op::Set if self.data.get(IDENTITY_VAULT_KEY).is_some() => {
                Err(BlobError::IdentityVaultProtected("overwrite"))
            }
            Op::Unset => Err(BlobError::IdentityVaultProtected("remove")),
            _ => Ok(()),
        }
    }

    fn auth_secret(data: &Value) -> Result<&str, BlobError> {
        data.get("auth_secret")
            .and_then(Value::as_str)
            .ok_or(BlobError::MissingAuthSecret)
    }

    fn endpoint(&self, path: &str) -> Result<Url, BlobError> {
        Ok(Url::parse(&format!("{}{}", self.url.trim_end_matches('/'), path))?)
    }

    /// Decrypt and apply one stored patch, advancing the revision on success
    fn apply_encrypted_patch(&mut self, sealed: &str) -> Result<(), BlobError> {
        let key = self.key.as_ref().ok_or(BlobError::MissingKey)?;
        let plain = key.decrypt(sealed)?;
        let patch = Patch::from_json(serde_json::from_slice(&plain)?)?;

        let mut next = self.data.clone();
        apply(&mut next, &patch)?;
        self.data = next;
        self.revision += 1;
        Ok(())
    }

    /// Apply `patch` locally and prepare its signed submission.
    ///
    /// Nothing changes unless both steps succeed.
    fn stage(&mut self, patch: &Patch) -> Result<SignedRequest, BlobError> {
        self.guard_identity_vault(patch)?;
        let key = self.key()?;

        let mut next = self.data.clone();
        apply(&mut next, patch)?;

        let sealed = key.encrypt(serde_json::to_string(&patch.to_json())?.as_bytes())?;
        let request = RequestDescriptor::post(
            self.endpoint("/v1/blob/patch")?,
            patch_body(&self.id, &sealed),
        )
        .sign_hmac(Self::auth_secret(&next)?, &self.id)?;

        self.data = next;
        self.revision += 1;
        Ok(request)
    }

    /// Encrypt the whole document under the blob key
    fn seal_document(&self) -> Result<String, BlobError> {
        let key = self.key()?;
        Ok(key.encrypt(serde_json::to_string(&self.data)?.as_bytes())?)
    }
}

/// A decrypted blob document.
///
/// Local changes are serialized through one lock; network submission happens
/// after the lock is released, so a later change may be applied before an
/// earlier one has been acknowledged.
#[derive(Clone)]
pub struct Blob(Arc<Mutex<BlobInner>>, Arc<dyn Transport>);

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Blob").finish_non_exhaustive()
    }
}

/// Accept bare hosts for the vault url
fn normalize_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

async fn submit(transport: &dyn Transport, request: SignedRequest) -> Result<HttpResponse, BlobError> {
    let response = transport.send(request.into_http_request()).await?;
    check_status(response)
}

fn check_status(response: HttpResponse) -> Result<HttpResponse, BlobError> {
    if response.status.is_success() {
        Ok(response)
    } else if response.status == StatusCode::CONFLICT {
        Err(BlobError::RevisionConflict(response.message()))
    } else {
        Err(BlobError::HttpStatus(response.status, response.message()))
    }
}

impl Blob {
    pub fn new(url: &str, id: &str, key: Secret, transport: Arc<dyn Transport>) -> Self {
        let inner = BlobInner {
            id: id.to_string(),
            url: normalize_url(url),
            key: Some(key),
            revision: 0,
            data: Value::Object(Map::new()),
            state: BlobState::Uninitialized,
            encrypted_secret: None,
        };
        Self(Arc::new(Mutex::new(inner)), transport)
    }

    /// Rebuild a decrypted blob from a [`BlobSnapshot`]
    pub fn restore(snapshot: BlobSnapshot, transport: Arc<dyn Transport>) -> Self {
        let inner = BlobInner {
            id: snapshot.id,
            url: normalize_url(&snapshot.url),
            key: Some(snapshot.key),
            revision: snapshot.revision,
            data: snapshot.data,
            state: BlobState::Decrypted,
            encrypted_secret: snapshot.encrypted_secret,
        };
        Self(Arc::new(Mutex::new(inner)), transport)
    }

    pub async fn inner(&self) -> BlobInner {
        self.0.lock().await.clone()
    }

    pub async fn id(&self) -> String {
        self.0.lock().await.id.clone()
    }

    pub async fn url(&self) -> String {
        self.0.lock().await.url.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.0.lock().await.revision
    }

    pub async fn state(&self) -> BlobState {
        self.0.lock().await.state
    }

    pub async fn data(&self) -> Value {
        self.0.lock().await.data.clone()
    }

    /// Value at an RFC 6901 pointer, if present
    pub async fn get(&self, pointer: &str) -> Option<Value> {
        self.0.lock().await.data.pointer(pointer).cloned()
    }

    pub async fn snapshot(&self) -> Result<BlobSnapshot, BlobError> {
        let inner = self.0.lock().await;
        let key = inner.ready()?.clone();
        Ok(BlobSnapshot {
            id: inner.id.clone(),
            url: inner.url.clone(),
            key,
            revision: inner.revision,
            data: inner.data.clone(),
            encrypted_secret: inner.encrypted_secret.clone(),
        })
    }

    /// Decrypt the vault's copy and replay its outstanding patches.
    ///
    /// A patch that fails to decrypt or apply is skipped; the rest still
    /// replay. If every patch replayed, the result is consolidated into a
    /// fresh snapshot (failures there are logged and ignored). If the
    /// snapshot itself does not decrypt, the key is dropped and the blob
    /// stays uninitialized.
    ///
    /// The consolidation runs in the background; `init` does not wait for it.
    pub async fn init(&self, envelope: BlobEnvelope) -> Result<InitReport, BlobError> {
        let mut report = InitReport {
            applied: 0,
            failed: 0,
            consolidation: None,
        };

        {
            let mut inner = self.0.lock().await;
            if inner.state != BlobState::Uninitialized {
                return Err(BlobError::InvalidState(inner.state));
            }
            if envelope.locked {
                return Err(BlobError::AccountLocked);
            }
            let key = inner.key.as_ref().ok_or(BlobError::MissingKey)?;

            let plain = match key.decrypt(&envelope.blob) {
                Ok(plain) => plain,
                Err(e) => {
                    tracing::warn!(blob_id = %inner.id, "failed to decrypt blob: {e}");
                    inner.key = None;
                    return Err(e.into());
                }
            };
            let data: Value = match serde_json::from_slice(&plain) {
                Ok(data @ Value::Object(_)) => data,
                _ => {
                    inner.key = None;
                    return Err(BlobError::MalformedDocument);
                }
            };

            inner.data = data;
            inner.revision = envelope.revision;
            inner.encrypted_secret = envelope.encrypted_secret.clone();
            inner.state = BlobState::Decrypted;

            for (i, sealed) in envelope.patches.iter().enumerate() {
                match inner.apply_encrypted_patch(sealed) {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        tracing::warn!(blob_id = %inner.id, patch = i, "failed to replay patch: {e}");
                        report.failed += 1;
                    }
                }
            }

            tracing::debug!(
                blob_id = %inner.id,
                revision = inner.revision,
                applied = report.applied,
                failed = report.failed,
                "blob decrypted"
            );
        }

        if report.applied > 0 && report.failed == 0 {
            let blob = self.clone();
            report.consolidation = Some(tokio::spawn(async move { blob.consolidate().await }));
        }
        Ok(report)
    }

    /// Apply a patch locally, then submit it to the vault.
    ///
    /// The revision advances when the local apply succeeds, before the
    /// submission resolves. A submission failure does not roll it back.
    /// Replacing or removing `/identityVault` is rejected under the same lock
    /// that applies the patch.
    pub async fn apply_update(&self, patch: Patch) -> Result<Value, BlobError> {
        let request = {
            let mut inner = self.0.lock().await;
            inner.ready()?;
            inner.state = BlobState::Mutating;
            let staged = inner.stage(&patch);
            inner.state = BlobState::Decrypted;
            staged?
        };

        tracing::debug!(op = %patch.op, pointer = %patch.pointer, "submitting patch");
        let response = submit(self.1.as_ref(), request).await?;
        Ok(response.json)
    }

    pub async fn set(&self, pointer: &str, value: Value) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Set, pointer, vec![value]))
            .await
    }

    pub async fn unset(&self, pointer: &str) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Unset, pointer, vec![]))
            .await
    }

    pub async fn extend(&self, pointer: &str, value: Value) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Extend, pointer, vec![value]))
            .await
    }

    pub async fn unshift(&self, pointer: &str, value: Value) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Unshift, pointer, vec![value]))
            .await
    }

    pub async fn push(&self, pointer: &str, value: Value) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Push, pointer, vec![value]))
            .await
    }

    pub async fn pop(&self, pointer: &str) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Pop, pointer, vec![]))
            .await
    }

    pub async fn shift(&self, pointer: &str) -> Result<Value, BlobError> {
        self.apply_update(Patch::new(Op::Shift, pointer, vec![]))
            .await
    }

    /// Apply `subcommands` to each element of the array at `pointer` whose
    /// `field` equals `value`
    pub async fn filter(
        &self,
        pointer: &str,
        field: &str,
        value: Value,
        subcommands: &[Subcommand],
    ) -> Result<Value, BlobError> {
        self.apply_update(Patch::filter(pointer, field, value, subcommands))
            .await
    }

    /// Send the whole document as a new snapshot, replacing the vault's patch
    /// log. Returns whether the vault accepted it; failures are logged only.
    pub async fn consolidate(&self) -> bool {
        match self.try_consolidate().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("blob consolidation failed: {e}");
                false
            }
        }
    }

    /// [`Blob::consolidate`], surfacing the failure
    pub async fn try_consolidate(&self) -> Result<Value, BlobError> {
        let request = {
            let mut inner = self.0.lock().await;
            inner.ready()?;
            inner.state = BlobState::Consolidating;
            let staged = (|| {
                let sealed = inner.seal_document()?;
                let body = json!({
                    "blob_id": inner.id,
                    "data": sealed,
                    "revision": inner.revision,
                });
                let request = RequestDescriptor::post(inner.endpoint("/v1/blob/consolidate")?, body)
                    .sign_hmac(BlobInner::auth_secret(&inner.data)?, &inner.id)?;
                Ok::<_, BlobError>(request)
            })();
            inner.state = BlobState::Decrypted;
            staged?
        };

        tracing::debug!("consolidating blob");
        let response = submit(self.1.as_ref(), request).await?;
        Ok(response.json)
    }

    /// Upload the whole document under `username`, authenticated by both the
    /// blob's HMAC signature and the login token.
    ///
    /// Returns the vault's reply and the refreshed login token, if it sent one.
    pub async fn update_blob(
        &self,
        username: &str,
        login_token: &str,
    ) -> Result<(Value, Option<String>), BlobError> {
        let request = {
            let inner = self.0.lock().await;
            inner.ready()?;
            let sealed = inner.seal_document()?;
            let body = json!({ "data": sealed, "revision": inner.revision });
            let url = inner.endpoint(&format!("/v1/user/{username}/updateBlob"))?;
            RequestDescriptor::post(url, body)
                .sign_hmac(BlobInner::auth_secret(&inner.data)?, &inner.id)?
        };

        let response = self
            .1
            .send(request.into_http_request().with_bearer(login_token))
            .await?;
        let response = check_status(response)?;
        let token = response.bearer_token();
        Ok((response.json, token))
    }

    /// Open the account secret stored with the blob
    pub async fn decrypt_secret(&self, unlock: &Secret) -> Result<String, BlobError> {
        let sealed = self
            .0
            .lock()
            .await
            .encrypted_secret
            .clone()
            .ok_or(BlobError::MissingEncryptedSecret)?;
        let plain = unlock.decrypt(&sealed)?;
        String::from_utf8(plain).map_err(|_| BlobError::MalformedDocument)
    }

    /// Wipe the document and key; the blob cannot be used afterwards
    pub async fn destroy(&self) {
        let mut inner = self.0.lock().await;
        inner.key = None;
        inner.data = Value::Null;
        inner.encrypted_secret = None;
        inner.revision = 0;
        inner.state = BlobState::Destroyed;
        tracing::debug!(blob_id = %inner.id, "blob destroyed");
    }
}
