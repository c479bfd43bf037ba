use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use common::client::{HttpTransport, Transport, TransportError, VaultClient};
use url::Url;

use crate::state::AppState;

#[derive(Clone)]
pub struct OpContext {
    /// How requests reach the vault and the PAKDF signer
    pub transport: Arc<dyn Transport>,
    /// `--vault` override for the configured vault URL
    pub vault: Option<Url>,
    /// Optional custom config path (defaults to ~/.blobvault)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(vault: Option<Url>, config_path: Option<PathBuf>) -> Result<Self, TransportError> {
        Ok(Self::with_transport(
            Arc::new(HttpTransport::new()?),
            vault,
            config_path,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        vault: Option<Url>,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            transport,
            vault,
            config_path,
        }
    }

    pub fn client(&self) -> VaultClient {
        VaultClient::new(self.transport.clone())
    }

    /// The vault URL: `--vault` if given, otherwise the configured one
    pub fn vault_url(&self, state: &AppState) -> String {
        match &self.vault {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => state.config.vault_url.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_override_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        let state = AppState::init(Some(temp.path().join("vault")), None).unwrap();

        let ctx = OpContext::new(None, None).unwrap();
        assert_eq!(ctx.vault_url(&state), state.config.vault_url);

        let ctx = OpContext::new(Some(Url::parse("https://vault.example.com/").unwrap()), None).unwrap();
        assert_eq!(ctx.vault_url(&state), "https://vault.example.com");
    }
}
