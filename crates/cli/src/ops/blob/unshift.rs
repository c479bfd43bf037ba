use clap::Args;

use super::{open, parse_value, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Unshift {
    /// JSON pointer of the array to prepend to
    pub pointer: String,

    /// Value as JSON (anything else is stored as a string)
    pub value: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Unshift {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let opened = open(ctx).await?;
        opened.blob.unshift(&self.pointer, parse_value(&self.value)).await?;
        let revision = opened.save().await?;

        Ok(format!("unshifted onto {} (revision {})", self.pointer, revision))
    }
}
