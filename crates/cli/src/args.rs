pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "vault")]
#[command(about = "Derive your keys, open and patch your encrypted blob")]
pub struct Args {
    /// Blob vault URL (overrides the configured one)
    #[arg(long, global = true)]
    pub vault: Option<Url>,

    /// Path to the blobvault config directory (defaults to ~/.blobvault)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
