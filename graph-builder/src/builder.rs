use std::collections::{HashMap, HashSet};

use crate::lsh::{build_buckets, nearest_buckets, HyperplaneFamily, Signature};
use crate::similarity::{similarity, NodeFeatures};

/// A similarity edge proposed by the LSH build, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEdge {
    pub source_id: String,
    pub target_id: String,
    pub weight: f32,
}

/// LSH-backed similarity index for one graph scope. Hyperplane seeds derive from the
/// scope id, so rebuilds over the same scope are reproducible.
pub struct GraphIndex {
    hyperplanes: HyperplaneFamily,
    r_neighbor_buckets: usize,
    top_k_edges: usize,
    similarity_threshold: f32,
}

impl GraphIndex {
    pub fn new(
        scope_key: &str,
        embedding_dim: usize,
        k_hyperplanes: u32,
        r_neighbor_buckets: usize,
        top_k_edges: usize,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            hyperplanes: HyperplaneFamily::new(scope_key, k_hyperplanes, embedding_dim),
            r_neighbor_buckets,
            top_k_edges,
            similarity_threshold,
        }
    }

    /// Full similarity build in expected `O(n log n)`: bucket nodes via LSH, score pairs
    /// within each bucket and across its `r` nearest buckets, then retain the top-K
    /// highest-weight edges per node (ties broken by lower target id).
    pub fn build(&self, nodes: &[NodeFeatures]) -> Vec<CandidateEdge> {
        let node_by_id: HashMap<&str, &NodeFeatures> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let signatures: Vec<(String, Signature)> = nodes
            .iter()
            .filter_map(|n| {
                n.embedding
                    .as_ref()
                    .map(|e| (n.id.clone(), self.hyperplanes.signature(e)))
            })
            .collect();
        let buckets = build_buckets(&signatures);
        let all_signatures: Vec<Signature> = buckets.keys().copied().collect();

        let mut candidate_pairs: HashSet<(String, String)> = HashSet::new();
        for (sig, ids) in &buckets {
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    candidate_pairs.insert(ordered_pair(&ids[i], &ids[j]));
                }
            }
            for neighbor_sig in nearest_buckets(*sig, &all_signatures, self.r_neighbor_buckets) {
                if let Some(neighbor_ids) = buckets.get(&neighbor_sig) {
                    for a in ids {
                        for b in neighbor_ids {
                            candidate_pairs.insert(ordered_pair(a, b));
                        }
                    }
                }
            }
        }

        self.score_and_trim(&candidate_pairs, &node_by_id)
    }

    /// Incremental `AddNode`: compute the new node's signature, compare it against its own
    /// bucket and the `r` nearest buckets among `existing`, and emit up to top-K edges.
    pub fn add_node(&self, new_node: &NodeFeatures, existing: &[NodeFeatures]) -> Vec<CandidateEdge> {
        let Some(new_embedding) = &new_node.embedding else {
            return Vec::new();
        };
        let new_sig = self.hyperplanes.signature(new_embedding);

        let signatures: Vec<(String, Signature)> = existing
            .iter()
            .filter_map(|n| {
                n.embedding
                    .as_ref()
                    .map(|e| (n.id.clone(), self.hyperplanes.signature(e)))
            })
            .collect();
        let buckets = build_buckets(&signatures);
        let all_signatures: Vec<Signature> = buckets.keys().copied().collect();

        let mut candidates: Vec<String> = buckets.get(&new_sig).cloned().unwrap_or_default();
        for neighbor_sig in nearest_buckets(new_sig, &all_signatures, self.r_neighbor_buckets) {
            if let Some(ids) = buckets.get(&neighbor_sig) {
                candidates.extend(ids.iter().cloned());
            }
        }

        let node_by_id: HashMap<&str, &NodeFeatures> =
            existing.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut scored: Vec<CandidateEdge> = candidates
            .into_iter()
            .filter_map(|other_id| {
                let other = node_by_id.get(other_id.as_str())?;
                let weight = similarity(new_node, other);
                (weight >= self.similarity_threshold).then_some(CandidateEdge {
                    source_id: new_node.id.clone(),
                    target_id: other_id,
                    weight,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        scored.truncate(self.top_k_edges);
        scored
    }

    fn score_and_trim(
        &self,
        pairs: &HashSet<(String, String)>,
        node_by_id: &HashMap<&str, &NodeFeatures>,
    ) -> Vec<CandidateEdge> {
        let mut per_node: HashMap<String, Vec<CandidateEdge>> = HashMap::new();
        for (a, b) in pairs {
            let (Some(na), Some(nb)) = (node_by_id.get(a.as_str()), node_by_id.get(b.as_str()))
            else {
                continue;
            };
            let weight = similarity(na, nb);
            if weight < self.similarity_threshold {
                continue;
            }
            per_node.entry(a.clone()).or_default().push(CandidateEdge {
                source_id: a.clone(),
                target_id: b.clone(),
                weight,
            });
            per_node.entry(b.clone()).or_default().push(CandidateEdge {
                source_id: b.clone(),
                target_id: a.clone(),
                weight,
            });
        }

        let mut edges = Vec::new();
        for candidates in per_node.values_mut() {
            candidates.sort_by(|x, y| {
                y.weight
                    .partial_cmp(&x.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| x.target_id.cmp(&y.target_id))
            });
            candidates.truncate(self.top_k_edges);
            edges.extend(candidates.drain(..));
        }
        edges
    }
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Structural edges: nodes sharing a parent context get `sibling_of` edges ordered by
/// chunk index at a fixed weight (not subject to the similarity threshold), and explicit
/// parent/child pairs get `parent_of` edges.
pub struct StructuralNode {
    pub id: String,
    pub context_id: String,
    pub parent_node_id: Option<String>,
    pub chunk_index: u32,
}

pub const SIBLING_WEIGHT: f32 = 0.5;

pub fn structural_edges(nodes: &[StructuralNode]) -> Vec<CandidateEdge> {
    let mut edges = Vec::new();
    let mut by_context: HashMap<&str, Vec<&StructuralNode>> = HashMap::new();
    for node in nodes {
        by_context.entry(node.context_id.as_str()).or_default().push(node);
    }
    for siblings in by_context.values_mut() {
        siblings.sort_by_key(|n| n.chunk_index);
        for window in siblings.windows(2) {
            edges.push(CandidateEdge {
                source_id: window[0].id.clone(),
                target_id: window[1].id.clone(),
                weight: SIBLING_WEIGHT,
            });
        }
    }
    for node in nodes {
        if let Some(parent) = &node.parent_node_id {
            edges.push(CandidateEdge {
                source_id: parent.clone(),
                target_id: node.id.clone(),
                weight: 1.0,
            });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, embedding: Vec<f32>) -> NodeFeatures {
        NodeFeatures {
            id: id.to_string(),
            embedding: Some(embedding),
            tags: HashSet::new(),
            context_type: "note".to_string(),
            content: "chunking system performance overview".to_string(),
            keywords: HashSet::new(),
        }
    }

    #[test]
    fn build_connects_similar_nodes_above_threshold() {
        let index = GraphIndex::new("scope", 3, 12, 8, 16, 0.62);
        let nodes = vec![
            node("a", vec![1.0, 0.0, 0.0]),
            node("b", vec![0.99, 0.01, 0.0]),
            node("c", vec![0.0, 1.0, 0.0]),
        ];
        let edges = index.build(&nodes);
        assert!(edges.iter().any(|e| {
            (e.source_id == "a" && e.target_id == "b") || (e.source_id == "b" && e.target_id == "a")
        }));
    }

    #[test]
    fn build_never_produces_self_loops() {
        let index = GraphIndex::new("scope", 3, 12, 8, 16, 0.1);
        let nodes = vec![node("a", vec![1.0, 0.0, 0.0]), node("b", vec![1.0, 0.0, 0.0])];
        let edges = index.build(&nodes);
        assert!(edges.iter().all(|e| e.source_id != e.target_id));
    }

    #[test]
    fn structural_edges_link_siblings_in_chunk_order() {
        let nodes = vec![
            StructuralNode {
                id: "n0".to_string(),
                context_id: "ctx".to_string(),
                parent_node_id: None,
                chunk_index: 0,
            },
            StructuralNode {
                id: "n1".to_string(),
                context_id: "ctx".to_string(),
                parent_node_id: None,
                chunk_index: 1,
            },
        ];
        let edges = structural_edges(&nodes);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, "n0");
        assert_eq!(edges[0].target_id, "n1");
        assert_eq!(edges[0].weight, SIBLING_WEIGHT);
    }
}
