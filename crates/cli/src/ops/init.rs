use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Where auth info for usernames is published
    #[arg(long)]
    pub auth_info_url: Option<String>,

    /// Default username for login
    #[arg(long)]
    pub username: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            auth_info_url: self.auth_info_url.clone(),
            username: self.username.clone(),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            ..Default::default()
        };
        if let Some(vault) = &ctx.vault {
            config.vault_url = vault.as_str().trim_end_matches('/').to_string();
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let key = state.load_key()?;

        let output = format!(
            "Initialized blobvault directory at: {}\n\
             - Config: {}\n\
             - Account key: {}\n\
             - Public key: {}\n\
             - Vault: {}",
            state.dir.display(),
            state.config_path.display(),
            state.key_path.display(),
            key.public().to_hex(),
            state.config.vault_url,
        );

        Ok(output)
    }
}
