use clap::Args;
use common::custom_keys::KeysError;

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct VerifyPassword {
    /// Password to check against the logged-in account
    #[arg(long)]
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyPasswordError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("key derivation failed: {0}")]
    Keys(#[from] KeysError),
    #[error("password is incorrect")]
    Incorrect,
}

#[async_trait::async_trait]
impl crate::op::Op for VerifyPassword {
    type Error = VerifyPasswordError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = AppState::load(ctx.config_path.clone())?.load_session()?;
        let correct = session
            .keys
            .is_password_correct(&self.password, ctx.transport.as_ref())
            .await?;

        if !correct {
            return Err(VerifyPasswordError::Incorrect);
        }
        Ok("password is correct".to_string())
    }
}
