use clap::Args;

use super::{open, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Unset {
    /// JSON pointer to remove
    pub pointer: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Unset {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let opened = open(ctx).await?;
        opened.blob.unset(&self.pointer).await?;
        let revision = opened.save().await?;

        Ok(format!("unset {} (revision {})", self.pointer, revision))
    }
}
