//! Network plumbing.
//!
//! Everything that talks to a server goes through [`Transport`], so the
//! crypto and document layers can be driven by an in-memory stand-in.

mod http;
mod transport;
mod vault;

pub use http::HttpTransport;
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};
pub use vault::{FetchedBlob, VaultClient, VaultError};
