use serde::{Deserialize, Serialize};

/// A fixed-dimension vector in the embedding space.
///
/// Query and corpus vectors must come from the same embedding model and
/// version for similarity scores to be meaningful; the engine enforces this
/// by routing ingestion and retrieval through one shared provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    fn norm(&self) -> f32 {
        self.0.iter().fold(0.0f32, |acc, v| acc + v * v).sqrt()
    }

    /// Cosine similarity in `[-1, 1]`. Mismatched dimensions and zero
    /// vectors score 0.0 rather than poisoning a ranking with NaN.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let denom = self.norm() * other.norm();
        if denom == 0.0 || !denom.is_finite() {
            return 0.0;
        }
        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        dot / denom
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let a = Embedding::new(vec![0.5, 0.5, 0.0]);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let zero = Embedding::new(vec![0.0, 0.0]);
        let short = Embedding::new(vec![1.0]);
        let empty = Embedding::new(vec![]);
        assert_eq!(a.cosine_similarity(&zero), 0.0);
        assert_eq!(a.cosine_similarity(&short), 0.0);
        assert_eq!(empty.cosine_similarity(&empty), 0.0);
    }
}
