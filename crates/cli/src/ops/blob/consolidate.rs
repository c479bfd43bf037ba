use clap::Args;

use super::{open, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Consolidate;

#[async_trait::async_trait]
impl crate::op::Op for Consolidate {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let opened = open(ctx).await?;
        opened.blob.try_consolidate().await?;
        let revision = opened.save().await?;

        Ok(format!("consolidated at revision {}", revision))
    }
}
