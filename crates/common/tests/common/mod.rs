//! Shared test utilities: an in-memory vault that signs PAKDF requests and
//! stores blobs the way the real service does
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::One;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::auth_info::AuthInfo;
use common::blob::{Blob, BlobEnvelope};
use common::client::{HttpRequest, HttpResponse, Transport, TransportError};
use common::crypto::pakdf::fdh;
use common::crypto::{PakdfParams, Secret};
use common::custom_keys::CustomKeys;

pub const P: &str = "8d5e640c7ed9bc53ca592ce24a9a2a2ceb983acccbcd87a4094e38bcb959e8bf67e2655e3fbe4047";
pub const Q: &str = "f0ee2c6c01925ad8a1b833a096487cb1538a513f42c4766430f3d22e8234e853a5944d33dbd9472b";

pub const VAULT_URL: &str = "https://vault.example.com";
pub const AUTH_SECRET: &str = "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";
pub const REFRESHED_TOKEN: &str = "refreshed-token";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn big(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).unwrap()
}

pub fn test_params() -> PakdfParams {
    PakdfParams {
        modulus: big(P) * big(Q),
        exponent: BigUint::from(65537u32),
        alpha: BigUint::from(2u8),
        host: "auth.example.com".into(),
        url: Some("https://auth.example.com/api/sign".into()),
    }
}

pub fn auth_info(username: &str) -> AuthInfo {
    AuthInfo {
        username: username.to_string(),
        version: 3,
        exists: true,
        email_verified: true,
        blobvault: VAULT_URL.into(),
        pakdf: test_params(),
    }
}

/// What the vault keeps for one blob
#[derive(Debug, Clone, Default)]
pub struct StoredBlob {
    pub blob: String,
    pub patches: Vec<String>,
    pub revision: u64,
    pub encrypted_secret: Option<String>,
}

#[derive(Debug, Default)]
struct VaultState {
    blobs: HashMap<String, StoredBlob>,
    requests: Vec<HttpRequest>,
    // status forced onto the next patch submissions
    patch_status: Option<StatusCode>,
}

/// In-memory stand-in for both the PAKDF signer and the blob vault
#[derive(Debug)]
pub struct MemoryVault {
    params: PakdfParams,
    phi: BigUint,
    state: Mutex<VaultState>,
}

impl MemoryVault {
    pub fn new() -> Arc<Self> {
        let one = BigUint::one();
        Arc::new(Self {
            params: test_params(),
            phi: (big(P) - &one) * (big(Q) - &one),
            state: Mutex::new(VaultState::default()),
        })
    }

    fn sign(&self, info: &str, signreq: &BigUint) -> BigUint {
        let size = self.params.modulus_bytes().min(256).div_ceil(8);
        let mut i_public = BigUint::from_bytes_be(&fdh(info.as_bytes(), size));
        i_public |= BigUint::one();
        let e = (i_public * &self.params.exponent) % &self.phi;
        let d = e.modinv(&self.phi).unwrap();
        signreq.modpow(&d, &self.params.modulus)
    }

    /// Store `doc` encrypted under `key`, followed by `patches` encrypted the
    /// same way
    pub fn seed(&self, id: &str, key: &Secret, doc: &Value, patches: &[Value], revision: u64) {
        let stored = StoredBlob {
            blob: key.encrypt(doc.to_string().as_bytes()).unwrap(),
            patches: patches
                .iter()
                .map(|p| key.encrypt(p.to_string().as_bytes()).unwrap())
                .collect(),
            revision,
            encrypted_secret: None,
        };
        self.state.lock().unwrap().blobs.insert(id.to_string(), stored);
    }

    pub fn seed_raw(&self, id: &str, stored: StoredBlob) {
        self.state.lock().unwrap().blobs.insert(id.to_string(), stored);
    }

    pub fn stored(&self, id: &str) -> Option<StoredBlob> {
        self.state.lock().unwrap().blobs.get(id).cloned()
    }

    pub fn envelope(&self, id: &str) -> BlobEnvelope {
        let stored = self.stored(id).unwrap();
        BlobEnvelope {
            blob: stored.blob,
            patches: stored.patches,
            locked: false,
            revision: stored.revision,
            encrypted_secret: stored.encrypted_secret,
        }
    }

    pub fn fail_patches_with(&self, status: StatusCode) {
        self.state.lock().unwrap().patch_status = Some(status);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.path() == path)
            .collect()
    }

    fn route(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.url.path().to_string();
        let body = request.body.clone().unwrap_or(Value::Null);
        let mut state = self.state.lock().unwrap();

        match (request.method.as_str(), path.as_str()) {
            ("POST", "/api/sign") => {
                let info = body["info"].as_str().unwrap_or_default();
                let signreq = big(body["signreq"].as_str().unwrap_or("0"));
                let signres = self.sign(info, &signreq);
                ok(json!({ "result": "success", "signres": signres.to_str_radix(16) }))
            }
            ("GET", "/v1/authinfo") => {
                let username = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "username")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                ok(serde_json::to_value(auth_info(&username)).unwrap())
            }
            ("POST", "/v1/blob/patch") => {
                if let Some(status) = state.patch_status {
                    return HttpResponse::new(status, json!({ "result": "error", "message": "rejected" }));
                }
                let id = body["blob_id"].as_str().unwrap_or_default().to_string();
                let patch = body["patch"].as_str().unwrap_or_default().to_string();
                match state.blobs.get_mut(&id) {
                    Some(stored) => {
                        stored.patches.push(patch);
                        ok(json!({ "result": "success", "revision": stored.revision + stored.patches.len() as u64 }))
                    }
                    None => not_found(),
                }
            }
            ("POST", "/v1/blob/consolidate") => {
                let id = body["blob_id"].as_str().unwrap_or_default().to_string();
                match state.blobs.get_mut(&id) {
                    Some(stored) => {
                        stored.blob = body["data"].as_str().unwrap_or_default().to_string();
                        stored.revision = body["revision"].as_u64().unwrap_or_default();
                        stored.patches.clear();
                        ok(json!({ "result": "success" }))
                    }
                    None => not_found(),
                }
            }
            ("GET", p) if p.starts_with("/v1/blob/") => {
                let id = p.trim_start_matches("/v1/blob/");
                match state.blobs.get(id) {
                    Some(stored) => {
                        let mut response = ok(json!({
                            "result": "success",
                            "blob": stored.blob,
                            "patches": stored.patches,
                            "revision": stored.revision,
                            "encrypted_secret": stored.encrypted_secret,
                        }));
                        response.headers = bearer(REFRESHED_TOKEN);
                        response
                    }
                    None => not_found(),
                }
            }
            ("POST", p) if p.starts_with("/v1/user/") && p.ends_with("/updateBlob") => {
                let id = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "signature_blob_id")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default();
                match state.blobs.get_mut(&id) {
                    Some(stored) => {
                        stored.blob = body["data"].as_str().unwrap_or_default().to_string();
                        stored.revision = body["revision"].as_u64().unwrap_or_default();
                        stored.patches.clear();
                        let mut response = ok(json!({ "result": "success" }));
                        response.headers = bearer(REFRESHED_TOKEN);
                        response
                    }
                    None => not_found(),
                }
            }
            _ => not_found(),
        }
    }
}

fn ok(json: Value) -> HttpResponse {
    HttpResponse::new(StatusCode::OK, json)
}

fn not_found() -> HttpResponse {
    HttpResponse::new(StatusCode::NOT_FOUND, json!({ "result": "error", "message": "not found" }))
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

#[async_trait]
impl Transport for MemoryVault {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.route(&request);
        self.state.lock().unwrap().requests.push(request);
        Ok(response)
    }
}

/// A document that can sign its own updates
pub fn base_document() -> Value {
    json!({
        "auth_secret": AUTH_SECRET,
        "contacts": [],
    })
}

/// Set up a vault holding one blob, and a blob handle pointing at it
pub async fn setup_test_env(doc: Value, patches: &[Value]) -> (Arc<MemoryVault>, Blob, Secret) {
    init_tracing();
    let vault = MemoryVault::new();
    let key = Secret::generate().unwrap();
    vault.seed("blob-1", &key, &doc, patches, 0);
    let blob = Blob::new(VAULT_URL, "blob-1", key.clone(), vault.clone());
    (vault, blob, key)
}

/// Keys for `username` with login keys already derived from `password`
pub async fn logged_in_keys(vault: &Arc<MemoryVault>, username: &str, password: &str) -> CustomKeys {
    let mut keys = CustomKeys::new(auth_info(username));
    keys.derive_login_keys(password, vault.as_ref()).await.unwrap();
    keys
}
