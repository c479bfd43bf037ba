//! The encrypted JSON document kept on the vault.
//!
//! A blob is stored as one encrypted snapshot plus an ordered list of
//! encrypted patches. Opening it decrypts the snapshot and replays the
//! patches; every local change is applied here first and then submitted as a
//! new signed patch.
//!
//! Patches are arrays `[opcode, pointer, ...params]`, with pointers following
//! RFC 6901. See [`Op`] for the operation table.

mod apply;
mod error;
mod ops;
mod patch;
pub mod pointer;
mod store;

pub use apply::{apply, apply_op, deep_extend};
pub use error::{BlobError, PatchError};
pub use ops::{Op, OPS};
pub use patch::{compress, normalize_subcommands, Patch, Subcommand, SubcommandShape};
pub use store::{
    Blob, BlobEnvelope, BlobInner, BlobSnapshot, BlobState, InitReport, IDENTITY_VAULT_KEY,
};
