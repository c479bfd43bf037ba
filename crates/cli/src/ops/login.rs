use clap::Args;
use common::auth_info::{AuthInfo, AUTH_INFO_VERSION};
use common::blob::BlobError;
use common::client::VaultError;
use common::custom_keys::{CustomKeys, KeysError};
use url::Url;

use crate::state::{AppState, Session, StateError};

#[derive(Args, Debug, Clone)]
pub struct Login {
    /// Account username (defaults to the configured one)
    #[arg(long)]
    pub username: Option<String>,

    /// Account password
    #[arg(long)]
    pub password: String,

    /// PIN bound into the unlock key
    #[arg(long)]
    pub pin: Option<String>,

    /// Login token issued by the vault; when given, the blob is opened right away
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("key derivation failed: {0}")]
    Keys(#[from] KeysError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("invalid auth info url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no username given and none configured")]
    MissingUsername,
    #[error("no auth_info_url or pakdf parameters configured")]
    MissingPakdf,
}

impl Login {
    async fn auth_info(
        &self,
        ctx: &crate::op::OpContext,
        state: &AppState,
        username: &str,
    ) -> Result<AuthInfo, LoginError> {
        let mut auth_info = match &state.config.auth_info_url {
            Some(url) => {
                ctx.client()
                    .fetch_auth_info(&Url::parse(url)?, username)
                    .await?
            }
            None => AuthInfo {
                username: username.to_string(),
                version: AUTH_INFO_VERSION,
                exists: true,
                email_verified: false,
                blobvault: ctx.vault_url(state),
                pakdf: state.config.pakdf.clone().ok_or(LoginError::MissingPakdf)?,
            },
        };
        if ctx.vault.is_some() {
            auth_info.blobvault = ctx.vault_url(state);
        }
        Ok(auth_info)
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Login {
    type Error = LoginError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let username = self
            .username
            .clone()
            .or_else(|| state.config.username.clone())
            .ok_or(LoginError::MissingUsername)?;

        let mut keys = CustomKeys::new(self.auth_info(ctx, &state, &username).await?);
        let transport = ctx.transport.as_ref();
        keys.derive_login_keys(&self.password, transport).await?;
        keys.derive_unlock_keys(&self.password, self.pin.as_deref(), transport)
            .await?;

        let mut session = Session {
            keys,
            login_token: self.token.clone(),
            blob: None,
        };
        let mut output = format!("Logged in as {}", session.keys.username());

        if let Some(token) = &self.token {
            let (blob, report, refreshed) = ctx.client().open_blob(&session.keys, token).await?;
            if refreshed.is_some() {
                session.login_token = refreshed;
            }
            let (applied, failed) = (report.applied, report.failed);
            // the process exits right after, so let consolidation finish first
            report.consolidated().await;
            session.blob = Some(blob.snapshot().await?);
            output.push_str(&format!(
                "\nOpened blob at revision {} ({} patches replayed, {} failed)",
                blob.revision().await,
                applied,
                failed
            ));
        }

        state.save_session(&session)?;
        tracing::info!(username = %session.keys.username(), "logged in");
        Ok(output)
    }
}
