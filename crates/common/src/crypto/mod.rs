//! Cryptographic primitives for the blob vault
//!
//! - **Envelopes**: AES-256-CCM with a 64-bit tag and a version byte, the at-rest
//!   format for the blob, its patches, and sealed secrets
//! - **PAKDF**: blinded, server-assisted derivation of symmetric keys from a password
//! - **Account keys**: secp256k1 keys for asymmetric request signatures
//! - **Recovery**: keys derived from the account secret that wrap the blob key
//!
//! # Security Model
//!
//! The vault server stores only ciphertext. The blob key (`crypt`) is derived
//! through PAKDF, so neither the signing service nor the vault ever sees the
//! password or the key. The signing service sees a blinded value that is
//! re-randomized on every attempt.

pub mod envelope;
mod jacobi;
mod keys;
pub mod pakdf;
pub mod recovery;
mod secret;

pub use envelope::EnvelopeError;
pub use jacobi::jacobi;
pub use keys::{KeyError, PublicKey, SecretKey, RECOVERABLE_SIGNATURE_SIZE};
pub use pakdf::{DerivationCause, PakdfError, PakdfParams, PakdfTokens, Purpose};
pub use recovery::{derive_recovery_key, unwrap_blob_key, wrap_blob_key, RecoveryError};
pub use secret::{Secret, SecretError, SECRET_SIZE};
