use std::collections::HashSet;

/// The minimal feature set the similarity score needs from a node; decoupled from
/// `common::storage::types::context_node::ContextNode` so this crate never depends on how
/// the store shapes its records.
#[derive(Debug, Clone)]
pub struct NodeFeatures {
    pub id: String,
    pub embedding: Option<Vec<f32>>,
    /// Node tags unioned with its parent context's tags, as the coefficient contract requires.
    pub tags: HashSet<String>,
    pub context_type: String,
    pub content: String,
    pub keywords: HashSet<String>,
}

pub const W_COSINE: f32 = 0.55;
pub const W_TAG_JACCARD: f32 = 0.15;
pub const W_TYPE_EQUAL: f32 = 0.10;
pub const W_SHINGLE_JACCARD: f32 = 0.10;
pub const W_KEYWORD_JACCARD: f32 = 0.10;

/// Weighted-sum similarity score in `[0, 1]` between two nodes, per the C4 contract:
/// `0.55*cosine + 0.15*tag_jaccard + 0.10*type_equal + 0.10*shingle_jaccard + 0.10*keyword_jaccard`.
pub fn similarity(a: &NodeFeatures, b: &NodeFeatures) -> f32 {
    let cosine = match (&a.embedding, &b.embedding) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => 0.0,
    };
    let tag_jaccard = jaccard(&a.tags, &b.tags);
    let type_equal = if a.context_type == b.context_type {
        1.0
    } else {
        0.0
    };
    let shingle_jaccard = shingle_overlap(&a.content, &b.content);
    let keyword_jaccard = jaccard(&a.keywords, &b.keywords);

    W_COSINE * cosine
        + W_TAG_JACCARD * tag_jaccard
        + W_TYPE_EQUAL * type_equal
        + W_SHINGLE_JACCARD * shingle_jaccard
        + W_KEYWORD_JACCARD * keyword_jaccard
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// 4-gram Jaccard overlap over lowercased whitespace tokens.
pub fn shingle_overlap(a: &str, b: &str) -> f32 {
    let shingles_a = shingles(a);
    let shingles_b = shingles(b);
    jaccard(&shingles_a, &shingles_b)
}

fn shingles(text: &str) -> HashSet<String> {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if tokens.len() < 4 {
        return tokens.into_iter().collect();
    }
    tokens
        .windows(4)
        .map(|w| w.join(" "))
        .collect::<HashSet<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, embedding: Vec<f32>, tags: &[&str], ty: &str, content: &str) -> NodeFeatures {
        NodeFeatures {
            id: id.to_string(),
            embedding: Some(embedding),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            context_type: ty.to_string(),
            content: content.to_string(),
            keywords: HashSet::new(),
        }
    }

    #[test]
    fn identical_nodes_score_near_one() {
        let a = node("a", vec![1.0, 0.0, 0.0], &["x"], "note", "chunking system performance");
        let b = node("b", vec![1.0, 0.0, 0.0], &["x"], "note", "chunking system performance");
        let score = similarity(&a, &b);
        assert!(score > 0.95, "expected near-identical score, got {score}");
    }

    #[test]
    fn orthogonal_unrelated_nodes_score_low() {
        let a = node("a", vec![1.0, 0.0], &["x"], "note", "apples and oranges");
        let b = node("b", vec![0.0, 1.0], &["y"], "code", "quantum entanglement");
        let score = similarity(&a, &b);
        assert!(score < 0.2, "expected low score, got {score}");
    }

    #[test]
    fn weights_sum_to_one() {
        let total = W_COSINE + W_TAG_JACCARD + W_TYPE_EQUAL + W_SHINGLE_JACCARD + W_KEYWORD_JACCARD;
        assert!((total - 1.0).abs() < f32::EPSILON);
    }
}
