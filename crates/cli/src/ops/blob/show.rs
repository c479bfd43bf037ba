use clap::Args;

use super::{open, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// JSON pointer to show (defaults to the whole document)
    pub pointer: Option<String>,
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let opened = open(ctx).await?;
        let value = match &self.pointer {
            Some(pointer) => opened
                .blob
                .get(pointer)
                .await
                .ok_or_else(|| BlobOpError::NotFound(pointer.clone()))?,
            None => opened.blob.data().await,
        };
        opened.save().await?;

        Ok(serde_json::to_string_pretty(&value)?)
    }
}
