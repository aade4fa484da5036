//! Prompt embeddings for the fuzzy cache path.
//!
//! The cache only needs "text in, fixed-length vector out". No model is
//! prescribed; [`NullEmbedder`] turns the fuzzy path off and
//! [`HashingEmbedder`] is a local bag-of-words projection.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Text embedding backend.
pub trait Embedder: Send + Sync {
    /// Embed `text`, or `None` when no embedding can be produced
    fn embed(&self, text: &str) -> Option<Vec<f32>>;

    /// Whether this embedder produces vectors at all
    fn is_available(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Embedder that never embeds. Lookups stay on the exact-hash path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Deterministic pseudo-embedding: every lowercased word seeds a generator
/// from its SHA-256 digest, which draws one angle per dimension; the sin/cos
/// components are summed over words and normalised to unit length.
///
/// Word hashing does not depend on a per-process seed, so vectors stored by
/// one process stay comparable in the next.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn word_seed(word: &str) -> u64 {
    let digest = Sha256::digest(word.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if self.dimensions == 0 {
            return None;
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return None;
        }

        let mut acc = vec![0.0f64; self.dimensions];
        for word in &words {
            let mut rng = StdRng::seed_from_u64(word_seed(word));
            for (i, slot) in acc.iter_mut().enumerate() {
                let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                *slot += if i % 2 == 0 { angle.sin() } else { angle.cos() };
            }
        }

        let norm: f64 = acc.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < 1e-9 {
            return None;
        }
        Some(acc.iter().map(|v| (v / norm) as f32).collect())
    }

    fn is_available(&self) -> bool {
        self.dimensions > 0
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let mag_a: f64 = a.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
    if mag_a < 1e-9 || mag_b < 1e-9 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Little-endian f32 BLOB encoding
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`]; `None` for a truncated blob
pub(crate) fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
