//! Grouping, ranking, and truncation of raw search hits.
//!
//! Groups are ranked by their best member and reported by the mean of the
//! members that survive truncation. Every sort is stable, so ties keep the
//! order in which the store returned the hits.

use std::collections::HashMap;

use crate::models::{GraphNode, ItemScore, CHUNK_LABEL};
use crate::store::Hit;

use super::modes::ModeConfig;

/// Cosine similarity of two vectors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < 1e-8 || norm_b < 1e-8 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Merges vector and keyword hits.
///
/// Each list is scaled by its own maximum, a node found by both keeps the
/// larger scaled score, and the union is re-ranked and cut to `top_k`.
pub fn merge_hybrid(vector: Vec<Hit>, keyword: Vec<Hit>, top_k: usize) -> Vec<Hit> {
    fn normalized(hits: Vec<Hit>) -> Vec<Hit> {
        let max = hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);
        if max <= 0.0 || !max.is_finite() {
            return hits;
        }
        hits.into_iter()
            .map(|h| Hit {
                score: h.score / max,
                ..h
            })
            .collect()
    }

    let mut merged: Vec<Hit> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for hit in normalized(vector).into_iter().chain(normalized(keyword)) {
        match index.get(&hit.node.element_id) {
            Some(&i) => {
                if hit.score > merged[i].score {
                    merged[i].score = hit.score;
                }
                if merged[i].embedding.is_none() {
                    merged[i].embedding = hit.embedding;
                }
            }
            None => {
                index.insert(hit.node.element_id.clone(), merged.len());
                merged.push(hit);
            }
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(top_k);
    merged
}

/// How hits are grouped.
pub enum GroupBy<'a> {
    /// By owning document, looked up by the hit's element id. Hits without
    /// an owner are dropped.
    DocumentOf(&'a HashMap<String, GraphNode>),
    /// Every hit forms its own group.
    SelfGrouped,
}

/// A retained hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub node: GraphNode,
    pub score: f64,
    pub embedding: Option<Vec<f32>>,
}

/// A group that survived ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedGroup {
    /// Owning document, or `None` for self-grouped hits.
    pub owner: Option<GraphNode>,
    /// Retained items, best first, at most the per-group limit.
    pub items: Vec<ScoredItem>,
    /// Best score of any member, before truncation.
    pub rank_score: f64,
    /// Mean score of the retained items.
    pub score: f64,
}

impl RankedGroup {
    /// Retained items sorted by `position`, for rendering in document order.
    pub fn items_in_document_order(&self) -> Vec<&ScoredItem> {
        let mut items: Vec<&ScoredItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.node.position().unwrap_or(i64::MAX));
        items
    }

    /// Per-item scores, best first. Chunks are reported by their domain id,
    /// everything else by element id.
    pub fn item_scores(&self) -> Vec<ItemScore> {
        self.items
            .iter()
            .map(|item| ItemScore {
                id: if item.node.has_label(CHUNK_LABEL) {
                    item.node.id().to_string()
                } else {
                    item.node.element_id.clone()
                },
                score: item.score,
            })
            .collect()
    }

    /// Element id of the owner, or of the single item for self-grouped hits.
    pub fn key(&self) -> &str {
        match &self.owner {
            Some(owner) => &owner.element_id,
            None => self
                .items
                .first()
                .map(|i| i.node.element_id.as_str())
                .unwrap_or_default(),
        }
    }
}

/// Groups, ranks, and truncates hits.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator {
    pub group_limit: usize,
    pub per_group_limit: usize,
}

impl ScoreAggregator {
    pub fn new(group_limit: usize, per_group_limit: usize) -> Self {
        Self {
            group_limit,
            per_group_limit,
        }
    }

    pub fn for_mode(mode: &ModeConfig) -> Self {
        Self::new(mode.group_limit, mode.per_group_limit)
    }

    pub fn aggregate(&self, hits: Vec<Hit>, group_by: GroupBy<'_>) -> Vec<RankedGroup> {
        // Groups in first-seen order; duplicates of a node keep their best score
        let mut groups: Vec<(Option<GraphNode>, Vec<ScoredItem>)> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        for hit in hits {
            let (key, owner) = match &group_by {
                GroupBy::DocumentOf(owners) => match owners.get(&hit.node.element_id) {
                    Some(doc) => (doc.element_id.clone(), Some(doc.clone())),
                    None => {
                        dropped += 1;
                        continue;
                    }
                },
                GroupBy::SelfGrouped => (hit.node.element_id.clone(), None),
            };

            let slot = *group_index.entry(key).or_insert_with(|| {
                groups.push((owner, Vec::new()));
                groups.len() - 1
            });
            let items = &mut groups[slot].1;
            match items
                .iter_mut()
                .find(|i| i.node.element_id == hit.node.element_id)
            {
                Some(existing) => {
                    existing.score = existing.score.max(hit.score);
                    if existing.embedding.is_none() {
                        existing.embedding = hit.embedding;
                    }
                }
                None => items.push(ScoredItem {
                    node: hit.node,
                    score: hit.score,
                    embedding: hit.embedding,
                }),
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Hits without an owning document dropped");
        }

        let mut ranked: Vec<RankedGroup> = groups
            .into_iter()
            .map(|(owner, mut items)| {
                let rank_score = items
                    .iter()
                    .map(|i| i.score)
                    .fold(f64::NEG_INFINITY, f64::max);
                items.sort_by(|a, b| b.score.total_cmp(&a.score));
                items.truncate(self.per_group_limit);
                let scores: Vec<f64> = items.iter().map(|i| i.score).collect();
                RankedGroup {
                    owner,
                    score: mean(&scores),
                    rank_score,
                    items,
                }
            })
            .filter(|g| !g.items.is_empty())
            .collect();

        ranked.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));
        ranked.truncate(self.group_limit);
        ranked
    }
}
