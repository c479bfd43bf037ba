//! Canonical request signing
//!
//! Requests to the vault are authenticated by a signature over a canonical
//! form of the request (method, path, query, and a hash of the key-sorted JSON
//! body), bound to a timestamp. The signature and its metadata travel as
//! `signature*` query parameters, never in the body.

mod canonical;
mod request;

pub use canonical::{canonical_json, canonical_request, sha512_hex, sort_keys, string_to_sign};
pub use request::{
    format_date, message_digest, patch_body, RequestDescriptor, SignError, SignatureType,
    SignedRequest, SIGNED_MESSAGE_MAGIC,
};
