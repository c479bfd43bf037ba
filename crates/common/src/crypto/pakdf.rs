//! Peer-assisted key derivation (PAKDF)
//!
//! Turns a low-entropy secret (a password) into high-entropy keys with the help
//! of a remote RSA-like signing service, without the service ever seeing the
//! secret or the derived key.
//!
//! The client hashes the secret into the group, blinds it with a random
//! factor, and asks the server to sign the blinded value. Unblinding the
//! server's answer yields a value only the secret holder can compute, from
//! which two purpose-scoped tokens are taken with HMAC-SHA512.
//!
//! The blinding factor is drawn fresh for every attempt and never influences
//! the derived tokens.

use std::fmt;

use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use url::Url;

use super::jacobi::jacobi;
use super::secret::Secret;
use crate::client::{HttpRequest, Transport};

/// Protocol tag prefixed to every public info string
pub const PAKDF_VERSION: &str = "PAKDF_1_0_0";

/// Upper bound (in bytes) on the modulus size used for the public hash
const MAX_PUBLIC_BYTES: usize = 256;

/// Which pair of tokens a derivation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// `id` and `crypt`
    Login,
    /// `secretId` and `unlock`
    Unlock,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Login => "login",
            Purpose::Unlock => "unlock",
        }
    }

    /// Token names, identifier first and key second
    pub fn token_names(&self) -> [&'static str; 2] {
        match self {
            Purpose::Login => ["id", "crypt"],
            Purpose::Unlock => ["secretId", "unlock"],
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters the vault publishes for its PAKDF signing service
///
/// Big integers travel as hexadecimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PakdfParams {
    #[serde(with = "hex_biguint")]
    pub modulus: BigUint,
    #[serde(with = "hex_biguint")]
    pub exponent: BigUint,
    #[serde(with = "hex_biguint")]
    pub alpha: BigUint,
    pub host: String,
    /// Signing endpoint; derived from `host` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PakdfParams {
    /// The URL blinded requests are posted to
    pub fn endpoint(&self) -> Result<Url, PakdfError> {
        if let Some(url) = &self.url {
            return Url::parse(url).map_err(|e| PakdfError::InvalidParams(e.to_string()));
        }
        match Url::parse(&self.host) {
            Ok(url) if url.has_host() => Ok(url),
            _ => Url::parse(&format!("https://{}", self.host))
                .map_err(|e| PakdfError::InvalidParams(e.to_string())),
        }
    }

    fn validate(&self) -> Result<(), PakdfError> {
        if self.modulus <= BigUint::one() || !self.modulus.bit(0) {
            return Err(PakdfError::InvalidParams("modulus must be odd and greater than one".into()));
        }
        if self.exponent.is_zero() {
            return Err(PakdfError::InvalidParams("exponent must be non-zero".into()));
        }
        Ok(())
    }

    /// Size in bytes of the modulus, `ceil(bits / 8)`
    pub fn modulus_bytes(&self) -> usize {
        ((7 + self.modulus.bits()) >> 3) as usize
    }
}

/// The two tokens produced by one derivation
///
/// `identifier` is an opaque locator (`id` or `secretId`); `key` is the
/// matching 256-bit symmetric key (`crypt` or `unlock`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakdfTokens {
    pub identifier: String,
    pub key: Secret,
}

/// Why a derivation did not complete
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationCause {
    #[error("could not reach server: {0}")]
    Unreachable(String),
    #[error("server rejected the request with status {0}")]
    Rejected(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PakdfError {
    #[error("could not query PAKDF server {host}: {cause}")]
    DerivationFailed { host: String, cause: DerivationCause },
    #[error("invalid PAKDF parameters: {0}")]
    InvalidParams(String),
    #[error("failed to gather randomness: {0}")]
    Random(String),
}

impl PakdfError {
    fn failed(host: &str, cause: DerivationCause) -> Self {
        PakdfError::DerivationFailed {
            host: host.to_string(),
            cause,
        }
    }
}

/// Length of a string as counted by the vault's other clients (UTF-16 code units)
fn info_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// `PAKDF_1_0_0:<len>:<host>:<len>:<username>:<len>:<purpose>:`
pub fn public_info(host: &str, username: &str, purpose: Purpose) -> String {
    let purpose = purpose.as_str();
    format!(
        "{PAKDF_VERSION}:{}:{host}:{}:{username}:{}:{purpose}:",
        info_len(host),
        info_len(username),
        info_len(purpose),
    )
}

/// Full domain hash: SHA-512 over a 32-bit big-endian counter followed by
/// `data`, repeated with an incrementing counter and truncated to `len` bytes.
pub fn fdh(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 64);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha512::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

/// `HMAC-SHA512(key, token)` truncated to 256 bits, lowercase hex
pub fn key_hash(key: &[u8], token: &str) -> String {
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    mac.update(token.as_bytes());
    hex::encode(&mac.finalize().into_bytes()[..32])
}

/// Uniform random integer in `[1, modulus)` with Jacobi symbol 1
fn random_residue(modulus: &BigUint) -> Result<BigUint, PakdfError> {
    let bits = modulus.bits();
    let len = ((bits + 7) / 8) as usize;
    let excess = (len as u64 * 8 - bits) as u32;
    let mut buf = vec![0u8; len];
    loop {
        getrandom::getrandom(&mut buf).map_err(|e| PakdfError::Random(e.to_string()))?;
        buf[0] &= 0xffu8 >> excess;
        let candidate = BigUint::from_bytes_be(&buf);
        if &candidate < modulus && jacobi(&candidate, modulus) == 1 {
            return Ok(candidate);
        }
    }
}

/// One blinded signing request, holding the factor needed to unblind the answer
pub struct BlindedRequest {
    info: String,
    signreq: BigUint,
    random: BigUint,
    modulus: BigUint,
}

impl fmt::Debug for BlindedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlindedRequest")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl BlindedRequest {
    /// Hash `secret` into the group and blind it with a fresh random factor
    pub fn new(
        params: &PakdfParams,
        purpose: Purpose,
        username: &str,
        secret: &str,
    ) -> Result<Self, PakdfError> {
        params.validate()?;
        let random = random_residue(&params.modulus)?;
        Ok(Self::with_random(params, purpose, username, secret, random))
    }

    /// Same as [`BlindedRequest::new`] with a caller-chosen blinding factor
    pub fn with_random(
        params: &PakdfParams,
        purpose: Purpose,
        username: &str,
        secret: &str,
        random: BigUint,
    ) -> Self {
        let modulus = &params.modulus;
        let info = public_info(&params.host, username, purpose);

        let public_size = params.modulus_bytes().min(MAX_PUBLIC_BYTES).div_ceil(8);
        let mut i_public = BigUint::from_bytes_be(&fdh(info.as_bytes(), public_size));
        i_public |= BigUint::one();

        let secret_info = format!("{info}{}:{secret}:", info_len(secret));
        let secret_hash = fdh(secret_info.as_bytes(), params.modulus_bytes());
        let mut i_secret = BigUint::from_bytes_be(&secret_hash) % modulus;
        if jacobi(&i_secret, modulus) != 1 {
            i_secret = (i_secret * &params.alpha) % modulus;
        }

        let blind = random.modpow(&(i_public * &params.exponent), modulus);
        let signreq = (i_secret * blind) % modulus;

        Self {
            info,
            signreq,
            random,
            modulus: modulus.clone(),
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    /// The blinded value, big-endian hex
    pub fn signreq_hex(&self) -> String {
        hex::encode(self.signreq.to_bytes_be())
    }

    /// JSON body posted to the signing service
    pub fn body(&self) -> Value {
        json!({ "info": self.info, "signreq": self.signreq_hex() })
    }

    /// Remove the blinding factor from the server's signature and take the
    /// purpose's two tokens from the result
    pub fn unblind(&self, signres: &BigUint, purpose: Purpose) -> Option<PakdfTokens> {
        let inverse = self.random.modinv(&self.modulus)?;
        let signed = (signres * inverse) % &self.modulus;
        let key = signed.to_bytes_be();

        let [id_name, key_name] = purpose.token_names();
        let identifier = key_hash(&key, id_name);
        let key = hex::decode(key_hash(&key, key_name)).ok()?;
        Some(PakdfTokens {
            identifier,
            key: Secret::from_slice(&key).ok()?,
        })
    }
}

/// Parse a hex big integer as sent by the signing service
fn parse_hex(value: &str) -> Option<BigUint> {
    let value = value.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);
    BigUint::parse_bytes(value.as_bytes(), 16)
}

/// Derive the `purpose` tokens for `username` and `secret`.
///
/// Performs exactly one round trip to the signing service. Nothing is retried;
/// every failure surfaces as [`PakdfError::DerivationFailed`].
pub async fn derive(
    params: &PakdfParams,
    purpose: Purpose,
    username: &str,
    secret: &str,
    transport: &dyn Transport,
) -> Result<PakdfTokens, PakdfError> {
    let endpoint = params.endpoint()?;
    let request = BlindedRequest::new(params, purpose, username, secret)?;

    tracing::debug!(host = %params.host, %purpose, "requesting PAKDF signature");

    let response = transport
        .send(HttpRequest::post(endpoint, request.body()))
        .await
        .map_err(|e| PakdfError::failed(&params.host, DerivationCause::Unreachable(e.to_string())))?;

    if !response.status.is_success() {
        tracing::warn!(host = %params.host, status = %response.status, "PAKDF server rejected request");
        return Err(PakdfError::failed(
            &params.host,
            DerivationCause::Rejected(response.status.as_u16()),
        ));
    }

    let signres = response
        .json
        .get("signres")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PakdfError::failed(
                &params.host,
                DerivationCause::MalformedResponse("missing signres".into()),
            )
        })?;
    let signres = parse_hex(signres).ok_or_else(|| {
        PakdfError::failed(
            &params.host,
            DerivationCause::MalformedResponse("signres is not hex".into()),
        )
    })?;

    request.unblind(&signres, purpose).ok_or_else(|| {
        PakdfError::failed(
            &params.host,
            DerivationCause::MalformedResponse("signres could not be unblinded".into()),
        )
    })
}

/// Serde adapter for big integers carried as hex strings
pub mod hex_biguint {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(16))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let hex = String::deserialize(deserializer)?;
        super::parse_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex integer: {hex}")))
    }
}
