use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use url::Url;

use super::canonical::{canonical_request, string_to_sign};
use crate::client::HttpRequest;
use crate::crypto::{KeyError, SecretKey};

/// Prefix for asymmetrically signed messages
pub const SIGNED_MESSAGE_MAGIC: &str = "Tidepay Signed Message:\n";

/// `YYYY-MM-DDTHH:MM:SS.000Z`, second precision
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("auth secret is not valid hex")]
    InvalidAuthSecret,
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Hmac,
    Ecdsa,
}

impl SignatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureType::Hmac => "RIPPLE1-HMAC-SHA512",
            SignatureType::Ecdsa => "RIPPLE1-ECDSA-SHA512",
        }
    }
}

pub fn format_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(DATE_FORMAT).to_string()
}

/// A request before signing
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub body: Value,
}

/// A request whose signature travels in its URL query
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub method: Method,
    /// Original URL plus the `signature*` query parameters
    pub url: Url,
    pub body: Value,
    pub timestamp: String,
    pub signature_type: SignatureType,
    pub signature: String,
}

impl SignedRequest {
    pub fn into_http_request(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url,
            body: Some(self.body),
            bearer: None,
        }
    }
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url, body: Value) -> Self {
        Self { method, url, body }
    }

    pub fn post(url: Url, body: Value) -> Self {
        Self::new(Method::POST, url, body)
    }

    fn string_to_sign(&self, signature_type: SignatureType, date: &str) -> String {
        let canonical = canonical_request(&self.method, &self.url, &self.body);
        string_to_sign(signature_type.as_str(), date, &canonical)
    }

    /// Sign with `HMAC-SHA512(auth_secret, stringToSign)`.
    ///
    /// `auth_secret` is the hex secret stored in the blob. The MAC travels as
    /// lowercase hex, which is already url safe.
    pub fn sign_hmac_at(
        &self,
        auth_secret: &str,
        blob_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, SignError> {
        let key = hex::decode(auth_secret).map_err(|_| SignError::InvalidAuthSecret)?;
        let date = format_date(&timestamp);
        let signature_type = SignatureType::Hmac;

        let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(&key)
            .map_err(|_| SignError::InvalidAuthSecret)?;
        mac.update(self.string_to_sign(signature_type, &date).as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("signature", &signature)
            .append_pair("signature_date", &date)
            .append_pair("signature_blob_id", blob_id)
            .append_pair("signature_type", signature_type.as_str());

        Ok(self.signed(url, date, signature_type, signature))
    }

    pub fn sign_hmac(&self, auth_secret: &str, blob_id: &str) -> Result<SignedRequest, SignError> {
        self.sign_hmac_at(auth_secret, blob_id, Utc::now())
    }

    /// Sign with a secp256k1 account key over the SHA-512 half digest of
    /// `MAGIC + stringToSign`. The signature is recoverable.
    pub fn sign_asymmetric_at(
        &self,
        secret_key: &SecretKey,
        account: &str,
        blob_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, SignError> {
        let date = format_date(&timestamp);
        let signature_type = SignatureType::Ecdsa;

        let prehash = message_digest(&self.string_to_sign(signature_type, &date));
        let signature = URL_SAFE_NO_PAD.encode(secret_key.sign_recoverable(&prehash)?);
        let public_key = secret_key.public().to_hex().to_uppercase();

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("signature", &signature)
            .append_pair("signature_date", &date)
            .append_pair("signature_blob_id", blob_id)
            .append_pair("signature_account", account)
            .append_pair("signature_public_key", &public_key)
            .append_pair("signature_type", signature_type.as_str());

        Ok(self.signed(url, date, signature_type, signature))
    }

    pub fn sign_asymmetric(
        &self,
        secret_key: &SecretKey,
        account: &str,
        blob_id: &str,
    ) -> Result<SignedRequest, SignError> {
        self.sign_asymmetric_at(secret_key, account, blob_id, Utc::now())
    }

    fn signed(
        &self,
        url: Url,
        timestamp: String,
        signature_type: SignatureType,
        signature: String,
    ) -> SignedRequest {
        SignedRequest {
            method: self.method.clone(),
            url,
            body: self.body.clone(),
            timestamp,
            signature_type,
            signature,
        }
    }
}

/// First 256 bits of `SHA512(MAGIC + message)`
pub fn message_digest(message: &str) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(SIGNED_MESSAGE_MAGIC.as_bytes());
    hasher.update(message.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize()[..32]);
    out
}

/// Body posted for a patch submission
pub fn patch_body(blob_id: &str, patch: &str) -> Value {
    json!({ "blob_id": blob_id, "patch": patch })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::PublicKey;
    use chrono::TimeZone;

    const AUTH_SECRET: &str = "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::post(
            Url::parse("https://vault.example.com/v1/blob/patch?ref=7").unwrap(),
            json!({
                "patch": "abc",
                "blob_id": "b1",
                "nested": { "z": 1, "a": [{ "y": 2, "x": 1 }] }
            }),
        )
    }

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, secs).unwrap()
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_date_format() {
        assert_eq!(format_date(&at(5)), "2024-01-02T03:04:05.000Z");
    }

    #[test]
    fn test_hmac_known_answer() {
        let signed = descriptor().sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        assert_eq!(
            signed.signature,
            "f3745b29dd2aca0a117069dde1486dc8621917d978f09d447374afd90670de9636a335e4b5b82203c2c94bd138d2b6462f4b413ca105309e40f90ae20b643379"
        );
        assert_eq!(signed.signature.len(), 128);
        assert!(signed.signature.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(signed.timestamp, "2024-01-02T03:04:05.000Z");
        assert_eq!(signed.signature_type, SignatureType::Hmac);
    }

    #[test]
    fn test_hmac_query_parameters() {
        let signed = descriptor().sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        let url = &signed.url;

        assert!(url.as_str().starts_with(
            "https://vault.example.com/v1/blob/patch?ref=7&signature="
        ));
        assert_eq!(query(url, "ref").as_deref(), Some("7"));
        assert_eq!(query(url, "signature"), Some(signed.signature.clone()));
        assert_eq!(
            query(url, "signature_date").as_deref(),
            Some("2024-01-02T03:04:05.000Z")
        );
        assert_eq!(query(url, "signature_blob_id").as_deref(), Some("b1"));
        assert_eq!(
            query(url, "signature_type").as_deref(),
            Some("RIPPLE1-HMAC-SHA512")
        );
        assert!(query(url, "signature_account").is_none());
        assert!(signed.body.get("signature").is_none());
        assert_eq!(signed.body, descriptor().body);
    }

    #[test]
    fn test_hmac_determinism_and_timestamp_binding() {
        let d = descriptor();
        let a = d.sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        let b = d.sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        let c = d.sign_hmac_at(AUTH_SECRET, "b1", at(6)).unwrap();
        assert_eq!(a.signature, b.signature);
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn test_hmac_binds_body() {
        let mut other = descriptor();
        other.body["patch"] = json!("abd");
        let a = descriptor().sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        let b = other.sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn test_url_without_query_gets_question_mark() {
        let d = RequestDescriptor::post(
            Url::parse("https://vault.example.com/v1/blob/consolidate").unwrap(),
            json!({}),
        );
        let signed = d.sign_hmac_at(AUTH_SECRET, "b1", at(5)).unwrap();
        assert!(signed
            .url
            .as_str()
            .starts_with("https://vault.example.com/v1/blob/consolidate?signature="));
    }

    #[test]
    fn test_invalid_auth_secret() {
        assert!(matches!(
            descriptor().sign_hmac_at("not hex", "b1", at(5)),
            Err(SignError::InvalidAuthSecret)
        ));
    }

    #[test]
    fn test_asymmetric_signature_recovers_public_key() {
        let key = SecretKey::generate().unwrap();
        let d = descriptor();
        let signed = d.sign_asymmetric_at(&key, "rAccount", "b1", at(5)).unwrap();

        assert_eq!(signed.signature_type, SignatureType::Ecdsa);
        assert_eq!(
            query(&signed.url, "signature_type").as_deref(),
            Some("RIPPLE1-ECDSA-SHA512")
        );
        assert_eq!(
            query(&signed.url, "signature_account").as_deref(),
            Some("rAccount")
        );
        let public_hex = query(&signed.url, "signature_public_key").unwrap();
        assert_eq!(public_hex, key.public().to_hex().to_uppercase());

        let raw = URL_SAFE_NO_PAD.decode(&signed.signature).unwrap();
        let prehash = message_digest(&d.string_to_sign(SignatureType::Ecdsa, "2024-01-02T03:04:05.000Z"));
        let recovered = PublicKey::recover(&prehash, &raw).unwrap();
        assert_eq!(recovered, key.public());
        assert_eq!(recovered, PublicKey::from_hex(&public_hex.to_lowercase()).unwrap());
    }

    #[test]
    fn test_asymmetric_signatures_differ_across_timestamps() {
        let key = SecretKey::generate().unwrap();
        let a = descriptor().sign_asymmetric_at(&key, "r", "b1", at(5)).unwrap();
        let b = descriptor().sign_asymmetric_at(&key, "r", "b1", at(6)).unwrap();
        assert_ne!(a.signature, b.signature);
    }
}
