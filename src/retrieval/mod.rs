//! Retrieval building blocks.
//!
//! Each component is a small, synchronous-to-reason-about step over typed
//! store records:
//!
//! - [`ModeRegistry`] - the immutable mode table
//! - [`ScoreAggregator`] - grouping, ranking, and truncation of hits
//! - [`SubgraphCollector`] - bounded entity-neighborhood expansion
//! - [`CommunityWalker`] - community memberships and parent chains
//! - [`LocalContext`] - entity-anchored context
//!
//! The orchestration lives in [`crate::services::ContextAssembler`].

mod aggregate;
mod community;
mod local;
mod modes;
pub mod render;
mod subgraph;

pub use aggregate::{
    cosine_similarity, mean, merge_hybrid, GroupBy, RankedGroup, ScoreAggregator, ScoredItem,
};
pub use community::{CommunityClosure, CommunityWalker};
pub use local::LocalContext;
pub use modes::{ModeConfig, ModeRegistry, RetrievalStrategy, DEFAULT_MODE};
pub use subgraph::{EntitySeed, Expansion, SubgraphCollector, MAX_TRAVERSAL_DEPTH};
