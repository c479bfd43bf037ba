use clap::Args;

use super::{open, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Extend {
    /// JSON pointer of the object to merge into
    pub pointer: String,

    /// JSON object to deep-merge
    pub value: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Extend {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let value = serde_json::from_str(&self.value)?;
        let opened = open(ctx).await?;
        opened.blob.extend(&self.pointer, value).await?;
        let revision = opened.save().await?;

        Ok(format!("extended {} (revision {})", self.pointer, revision))
    }
}
