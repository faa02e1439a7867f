//! Rank-fusion and normalization primitives shared by every search mode.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Clamps a raw relevance figure into `[0, 1]`.
pub fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Converts a non-negative distance into a `(0, 1]` similarity, `1.0` at distance `0`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Min-max normalizes `values` into `[0, 1]`. A degenerate (all-equal, empty, or
/// non-finite) slice normalizes to `1.0` everywhere rather than dividing by zero.
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || (max - min).abs() < f32::EPSILON {
        return values.iter().map(|_| 1.0).collect();
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Reciprocal Rank Fusion: `sum(1 / (k + rank))` across every ranking an id appears in,
/// rank 1-indexed. An id missing from a ranking simply contributes nothing from it.
/// Sorted descending by fused score, ties broken by id for determinism.
///
/// An id that ranks first in every supplied ranking attains the maximum possible fused
/// score (`rankings.len() as f32 / (k + 1)`), so it always sorts first in the output —
/// the monotonicity guarantee Hybrid search relies on.
pub fn reciprocal_rank_fusion(rankings: &[Vec<String>], k: u32) -> Vec<(String, f32)> {
    let mut totals: HashMap<String, f32> = HashMap::new();
    for ranking in rankings {
        for (index, id) in ranking.iter().enumerate() {
            let rank = (index + 1) as f32;
            *totals.entry(id.clone()).or_insert(0.0) += 1.0 / (k as f32 + rank);
        }
    }
    let mut fused: Vec<(String, f32)> = totals.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_top_ranking_wins_fusion() {
        let text = vec!["x".to_string(), "a".to_string(), "b".to_string()];
        let semantic = vec!["x".to_string(), "c".to_string(), "a".to_string()];
        let fused = reciprocal_rank_fusion(&[text, semantic], 60);
        assert_eq!(fused[0].0, "x");
    }

    #[test]
    fn absent_from_one_ranking_still_contributes() {
        let text = vec!["a".to_string(), "b".to_string()];
        let semantic = vec!["b".to_string()];
        let fused = reciprocal_rank_fusion(&[text, semantic], 60);
        let b_score = fused.iter().find(|(id, _)| id == "b").unwrap().1;
        let a_score = fused.iter().find(|(id, _)| id == "a").unwrap().1;
        assert!(b_score > a_score);
    }

    #[test]
    fn min_max_normalize_handles_degenerate_input() {
        assert_eq!(min_max_normalize(&[5.0, 5.0, 5.0]), vec![1.0, 1.0, 1.0]);
        assert_eq!(min_max_normalize(&[0.0, 5.0, 10.0]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn distance_to_similarity_is_bounded() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < f32::EPSILON);
        assert!(distance_to_similarity(10.0) < 0.2);
    }
}
