//! CLI module for kgrag.
//!
//! Subcommands:
//! - `retrieve`: Assemble context for a query embedding
//! - `export`: Export subgraphs for visualization
//! - `modes`: List the retrieval modes
//! - `document`: Per-document counts and listings
//!
//! Every command prints JSON to stdout.

mod document;
mod export;
mod retrieve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::Context;
use crate::retrieval::ModeRegistry;
use crate::store::MemoryStore;

pub use document::DocumentCommand;
pub use export::ExportCommand;
pub use retrieve::RetrieveArgs;

/// kgrag - graph-augmented retrieval over a document knowledge graph
#[derive(Parser)]
#[command(name = "kgrag")]
#[command(about = "Graph-augmented retrieval and context assembly")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Serve queries from a JSON graph fixture instead of Neo4j
    #[arg(long, global = true, value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Assemble context for a query
    Retrieve(RetrieveArgs),

    /// Export a subgraph for visualization
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },

    /// List the retrieval modes
    Modes,

    /// Document counts and listings
    Document {
        #[command(subcommand)]
        command: DocumentCommand,
    },
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> Result<()> {
        if let Command::Modes = self.command {
            return print_json(ModeRegistry::standard().modes());
        }

        let ctx = self.context().await?;
        let cancel = cancel_on_ctrl_c();

        match &self.command {
            Command::Retrieve(args) => args.run(&ctx, &cancel).await,
            Command::Export { command } => command.run(&ctx, &cancel).await,
            Command::Document { command } => command.run(&ctx).await,
            Command::Modes => Ok(()),
        }
    }

    /// Builds the context from the fixture, or from configuration.
    async fn context(&self) -> Result<Context> {
        let config = Config::load()?;
        match &self.fixture {
            Some(path) => {
                let store = load_fixture(path)?;
                Ok(Context::new(Arc::new(store), config))
            }
            None => Ok(Context::connect(config).await?),
        }
    }
}

fn load_fixture(path: &Path) -> Result<MemoryStore> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read fixture {}: {}", path.display(), e))?;
    let store = MemoryStore::from_json(&json)?;
    tracing::info!(fixture = %path.display(), "Loaded graph fixture");
    Ok(store)
}

/// A token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
