//! Export command handlers.

use clap::Subcommand;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::di::FromRef;
use crate::services::GraphExporter;

use super::print_json;

/// Export subcommands.
#[derive(Subcommand)]
pub enum ExportCommand {
    /// Export the graph around the chunks of documents
    Documents {
        /// Document file names
        #[arg(required = true)]
        names: Vec<String>,

        /// Chunks per document (defaults to export.chunk_limit)
        #[arg(long)]
        chunk_limit: Option<usize>,
    },

    /// Export explicit chunks, entities, and relationships
    Ids {
        /// Chunk id (repeatable)
        #[arg(long = "chunk")]
        chunks: Vec<String>,

        /// Entity element id (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,

        /// Relationship element id (repeatable)
        #[arg(long = "relationship")]
        relationships: Vec<String>,
    },

    /// Chunks, communities, and neighbors of entities
    Local {
        /// Entity element ids
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Community details
    Global {
        /// Community element ids
        #[arg(required = true)]
        communities: Vec<String>,
    },
}

impl ExportCommand {
    pub async fn run(&self, ctx: &Context, cancel: &CancellationToken) -> Result<()> {
        let exporter = GraphExporter::from_ref(ctx);
        match self {
            ExportCommand::Documents { names, chunk_limit } => {
                print_json(&exporter.export_by_documents(names, *chunk_limit, cancel).await?)
            }
            ExportCommand::Ids {
                chunks,
                entities,
                relationships,
            } => {
                if chunks.is_empty() && entities.is_empty() && relationships.is_empty() {
                    return Err(eyre!("Nothing to export: pass --chunk, --entity, or --relationship"));
                }
                let export = exporter
                    .export_by_ids(chunks, entities, relationships, cancel)
                    .await?;
                print_json(&export)
            }
            ExportCommand::Local { entities } => {
                print_json(&exporter.local_community_details(entities, cancel).await?)
            }
            ExportCommand::Global { communities } => {
                print_json(&exporter.global_community_details(communities, cancel).await?)
            }
        }
    }
}
