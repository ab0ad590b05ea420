use super::StorageError;
use super::types::EmbeddingModel;

/// Dimension of the offline hashing embedder.
pub const HASHING_DIM: usize = 384;

/// Deterministic bag-of-words embedder.
///
/// Each lower-cased word is hashed (FNV-1a) into one of `dimension` buckets
/// with a hash-derived sign, then the vector is L2-normalized. Texts sharing
/// vocabulary land close together, which is enough for offline use and tests
/// without a running embedding service.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: HASHING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        Ok(hashed_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hashed_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = fnv1a(&word.to_lowercase());
        let bucket = (hash % dim as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
    }

    l2_normalize(&mut vec);
    vec
}

fn fnv1a(word: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    word.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn embed_returns_configured_dimension() {
        let embedder = HashingEmbedder::new();
        assert_eq!(embedder.embed("karaoke bar").unwrap().len(), HASHING_DIM);
        assert_eq!(HashingEmbedder::with_dimension(16).dimension(), 16);
    }

    #[test]
    fn embed_is_deterministic() {
        let embedder = HashingEmbedder::new();
        assert_eq!(
            embedder.embed("client entertainment").unwrap(),
            embedder.embed("client entertainment").unwrap()
        );
    }

    #[test]
    fn embed_is_case_insensitive() {
        let embedder = HashingEmbedder::new();
        assert_eq!(
            embedder.embed("Karaoke Bar").unwrap(),
            embedder.embed("karaoke bar").unwrap()
        );
    }

    #[test]
    fn embed_is_l2_normalized() {
        let vec = HashingEmbedder::new().embed("gift policy for suppliers").unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm = {norm}");
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let vec = HashingEmbedder::new().embed("").unwrap();
        assert!(vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new();
        let query = embedder.embed("karaoke bar client entertainment").unwrap();
        let related = embedder.embed("Client entertainment at a karaoke bar is prohibited").unwrap();
        let unrelated = embedder.embed("Quarterly travel expense reconciliation deadline").unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn embed_batch_uses_default_impl() {
        let embedder = HashingEmbedder::new();
        let vecs = embedder.embed_batch(&["one", "two", "three"]).unwrap();
        assert_eq!(vecs.len(), 3);
    }
}
