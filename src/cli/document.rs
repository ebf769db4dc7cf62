//! Document command handlers.

use clap::Subcommand;
use color_eyre::Result;
use serde_json::json;

use crate::context::Context;
use crate::di::FromRef;
use crate::services::DocumentService;

use super::print_json;

/// Document subcommands.
#[derive(Subcommand)]
pub enum DocumentCommand {
    /// Number of chunks in a document
    Count { file_name: String },

    /// Chunk texts in document order
    Texts {
        file_name: String,

        #[arg(long, default_value = "0")]
        skip: usize,

        /// Page size (0 = export.chunk_limit)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Entities and relationships extracted from a document
    Stats { file_name: String },

    /// Entities that only this document mentions
    Orphans { file_name: String },
}

impl DocumentCommand {
    pub async fn run(&self, ctx: &Context) -> Result<()> {
        let service = DocumentService::from_ref(ctx);
        match self {
            DocumentCommand::Count { file_name } => {
                let total = service.count_chunks(file_name).await?;
                print_json(&json!({ "fileName": file_name, "total": total }))
            }
            DocumentCommand::Texts {
                file_name,
                skip,
                limit,
            } => print_json(&service.chunk_texts(file_name, *skip, *limit).await?),
            DocumentCommand::Stats { file_name } => {
                print_json(&service.graph_counts(file_name).await?)
            }
            DocumentCommand::Orphans { file_name } => {
                print_json(&service.orphaned_entities(file_name).await?)
            }
        }
    }
}
