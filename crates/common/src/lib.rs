/**
 * Account metadata published by the vault,
 *  including the PAKDF parameters for a username.
 */
pub mod auth_info;
/**
 * The encrypted JSON document: patch operations,
 *  pointer traversal, replay and consolidation.
 */
pub mod blob;
/**
 * Transport abstraction and the blob vault client.
 */
pub mod client;
/**
 * Cryptographic types and operations.
 *  - Envelope encryption of documents and patches
 *  - Blinded key derivation against the PAKDF signer
 *  - secp256k1 account keys
 */
pub mod crypto;
/**
 * The key bundle derived for one account.
 */
pub mod custom_keys;
/**
 * Canonical request signing for the vault API.
 */
pub mod signing;

pub mod prelude {
    pub use crate::auth_info::{normalize_username, AuthInfo};
    pub use crate::blob::{Blob, BlobEnvelope, BlobError, BlobSnapshot, BlobState, Op, Patch};
    pub use crate::client::{HttpTransport, Transport, VaultClient};
    pub use crate::crypto::{PublicKey, Purpose, Secret, SecretKey};
    pub use crate::custom_keys::{CustomKeys, KeysError};
    pub use crate::signing::{RequestDescriptor, SignatureType, SignedRequest};
}
