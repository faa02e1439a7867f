use std::collections::{hash_map::DefaultHasher, HashMap};
use std::hash::{Hash, Hasher};

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A `k`-bit signature produced by `k` random hyperplanes.
pub type Signature = u32;

/// Random-hyperplane LSH over fixed-dimension embeddings. Hyperplane seeds derive from
/// the scope id so two builds over the same scope produce identical buckets.
pub struct HyperplaneFamily {
    planes: Vec<Vec<f32>>,
}

impl HyperplaneFamily {
    /// `k` hyperplanes of dimension `dim`, deterministically seeded from `scope_key`.
    pub fn new(scope_key: &str, k: u32, dim: usize) -> Self {
        let seed = deterministic_seed(scope_key);
        let mut rng = StdRng::seed_from_u64(seed);
        let planes = (0..k)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect();
        Self { planes }
    }

    /// The k-bit signature for a node's embedding: bit `i` is 1 when the embedding lies on
    /// the positive side of hyperplane `i`.
    pub fn signature(&self, embedding: &[f32]) -> Signature {
        let mut sig: Signature = 0;
        for (i, plane) in self.planes.iter().enumerate() {
            let dot: f32 = plane
                .iter()
                .zip(embedding)
                .map(|(p, e)| p * e)
                .sum::<f32>();
            if dot >= 0.0 {
                sig |= 1 << i;
            }
        }
        sig
    }
}

fn deterministic_seed(scope_key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    scope_key.hash(&mut hasher);
    hasher.finish()
}

pub fn hamming_distance(a: Signature, b: Signature) -> u32 {
    (a ^ b).count_ones()
}

/// Groups node ids by LSH bucket signature, preserving deterministic bucket ordering by
/// sorting keys (callers then iterate buckets in ascending signature order).
pub fn build_buckets(signatures: &[(String, Signature)]) -> HashMap<Signature, Vec<String>> {
    let mut buckets: HashMap<Signature, Vec<String>> = HashMap::new();
    for (id, sig) in signatures {
        buckets.entry(*sig).or_default().push(id.clone());
    }
    for ids in buckets.values_mut() {
        ids.sort();
    }
    buckets
}

/// The `r` bucket signatures nearest to `target` by Hamming distance, excluding `target`
/// itself, ties broken by signature value for determinism.
pub fn nearest_buckets(target: Signature, all_signatures: &[Signature], r: usize) -> Vec<Signature> {
    let mut candidates: Vec<Signature> = all_signatures
        .iter()
        .copied()
        .filter(|s| *s != target)
        .collect();
    candidates.sort_unstable();
    candidates.dedup();
    candidates.sort_by_key(|s| (hamming_distance(target, *s), *s));
    candidates.truncate(r);
    candidates
}
