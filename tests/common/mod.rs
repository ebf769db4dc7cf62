//! Shared fixture for the in-memory integration tests.
//!
//! Two documents about early computing: doc1 (newer URL source) and doc2
//! (local file), four chunks, six entities, and a two-level community tree.

#![allow(dead_code)]

use std::sync::Arc;

use kgrag::config::Config;
use kgrag::context::Context;
use kgrag::store::{MemoryGraph, MemoryStore};

pub const FIXTURE: &str = include_str!("../fixtures/knowledge_graph.json");

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_json(FIXTURE).expect("fixture should load"))
}

/// Store built from an inline JSON graph.
pub fn store_from(graph: serde_json::Value) -> Arc<MemoryStore> {
    let graph: MemoryGraph = serde_json::from_value(graph).expect("graph should parse");
    Arc::new(MemoryStore::new(graph).expect("graph should load"))
}

pub fn context(store: Arc<MemoryStore>) -> Context {
    Context::new(store, Config::default())
}

pub fn context_with(store: Arc<MemoryStore>, config: Config) -> Context {
    Context::new(store, config)
}

pub fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Panics when the ids are not pairwise distinct.
pub fn assert_distinct<'a>(ids: impl IntoIterator<Item = &'a str>) {
    let mut seen = std::collections::BTreeSet::new();
    for id in ids {
        assert!(seen.insert(id), "duplicate id {}", id);
    }
}
