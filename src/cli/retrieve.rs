//! Retrieve command handler.

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::di::FromRef;
use crate::models::RetrievalRequest;
use crate::retrieval::DEFAULT_MODE;
use crate::services::ContextAssembler;

use super::print_json;

/// Arguments of `kgrag retrieve`.
#[derive(Args)]
pub struct RetrieveArgs {
    /// Retrieval mode (see `kgrag modes`)
    #[arg(long, default_value = DEFAULT_MODE)]
    pub mode: String,

    /// JSON array with the query embedding, or `-` for stdin
    #[arg(long, value_name = "FILE")]
    pub embedding: PathBuf,

    /// Keyword query for modes with a fulltext index
    #[arg(long)]
    pub keyword: Option<String>,

    /// Restrict chunk search to a document (repeatable)
    #[arg(long = "document", value_name = "FILE_NAME")]
    pub documents: Vec<String>,
}

impl RetrieveArgs {
    pub async fn run(&self, ctx: &Context, cancel: &CancellationToken) -> Result<()> {
        let embedding = self.read_embedding()?;
        let mut request =
            RetrievalRequest::new(&self.mode, embedding).with_documents(self.documents.iter().cloned());
        if let Some(keyword) = &self.keyword {
            request = request.with_keyword(keyword);
        }

        let assembler = ContextAssembler::from_ref(ctx);
        let result = assembler.retrieve(&request, cancel).await?;
        print_json(&result)
    }

    fn read_embedding(&self) -> Result<Vec<f32>> {
        let raw = if self.embedding.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .wrap_err("Failed to read embedding from stdin")?;
            buf
        } else {
            std::fs::read_to_string(&self.embedding)
                .wrap_err_with(|| format!("Failed to read {}", self.embedding.display()))?
        };

        let embedding: Vec<f32> =
            serde_json::from_str(&raw).wrap_err("Embedding must be a JSON array of numbers")?;
        if embedding.is_empty() {
            return Err(eyre!("Embedding is empty"));
        }
        Ok(embedding)
    }
}
