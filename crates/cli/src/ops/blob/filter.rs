use clap::Args;
use common::blob::normalize_subcommands;
use serde_json::Value;

use super::{open, parse_value, BlobOpError};

#[derive(Args, Debug, Clone)]
pub struct Filter {
    /// JSON pointer of the array to filter
    pub pointer: String,

    /// Field compared on each element
    pub field: String,

    /// Value the field must equal, as JSON
    pub value: String,

    /// Subcommands to run on each match, e.g. '["set", "/tag", "x"]' or
    /// '[["unset", "/tmp"], ["set", "/seen", true]]'
    pub subcommands: String,
}

#[async_trait::async_trait]
impl crate::op::Op for Filter {
    type Error = BlobOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let raw: Value = serde_json::from_str(&self.subcommands)?;
        let subcommands = normalize_subcommands(std::slice::from_ref(&raw))?;

        let opened = open(ctx).await?;
        opened
            .blob
            .filter(&self.pointer, &self.field, parse_value(&self.value), &subcommands)
            .await?;
        let revision = opened.save().await?;

        Ok(format!("filtered {} (revision {})", self.pointer, revision))
    }
}
