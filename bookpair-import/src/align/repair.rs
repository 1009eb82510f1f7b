//! Local repair of weak dialogue alignments
//!
//! Dialogue is often split differently between editions (one quoted line in
//! the source, two dash-led lines in the target, or the reverse). For each
//! pair below the similarity threshold that looks like speech, try fusing it
//! with the next pair on one side:
//! 1. target fuse: `src[i]` vs `tgt[i] + " " + tgt[i+1]`
//! 2. source fuse: `src[i] + " " + src[i+1]` vs `tgt[i]`
//!
//! The first fusion scoring at least `min_similarity - slack` replaces both
//! pairs. Otherwise the pair is kept as is.

use super::vector::{clamp01, cosine};
use super::AlignedPair;
use crate::oracle::EmbeddingOracle;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Similarity of two free texts on [0, 1]
#[async_trait]
pub trait TextSimilarity: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Cosine of fresh embeddings for both texts
pub struct EmbeddingSimilarity {
    oracle: Arc<dyn EmbeddingOracle>,
    degraded: AtomicUsize,
}

impl EmbeddingSimilarity {
    pub fn new(oracle: Arc<dyn EmbeddingOracle>) -> Self {
        Self {
            oracle,
            degraded: AtomicUsize::new(0),
        }
    }

    /// Embedding chunks that failed during repair
    pub fn degraded_chunks(&self) -> usize {
        self.degraded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TextSimilarity for EmbeddingSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> f64 {
        let outcome = self.oracle.embed(&[a.to_string(), b.to_string()]).await;
        self.degraded
            .fetch_add(outcome.degraded_chunks.len(), Ordering::Relaxed);
        match outcome.values.as_slice() {
            [va, vb] => clamp01(cosine(va, vb)),
            _ => 0.0,
        }
    }
}

/// Quote anywhere in the source, or quote / dash lead in the target
pub fn looks_like_speech(src: &str, tgt: &str) -> bool {
    src.contains('"') || tgt.contains('"') || tgt.starts_with('-') || tgt.starts_with('\u{2014}')
}

/// Repair weak speech-like pairs by fusing with the following pair
pub async fn repair(
    pairs: Vec<AlignedPair>,
    min_similarity: f64,
    slack: f64,
    similarity: &dyn TextSimilarity,
) -> Vec<AlignedPair> {
    let accept = min_similarity - slack;
    let mut out = Vec::with_capacity(pairs.len());
    let mut iter = pairs.into_iter().peekable();

    while let Some(pair) = iter.next() {
        if clamp01(pair.similarity) >= min_similarity || !looks_like_speech(&pair.src_text, &pair.tgt_text) {
            out.push(pair);
            continue;
        }
        let Some(next) = iter.peek() else {
            out.push(pair);
            continue;
        };

        let fused_tgt = format!("{} {}", pair.tgt_text, next.tgt_text);
        let sim = similarity.similarity(&pair.src_text, &fused_tgt).await;
        if sim >= accept {
            debug!(location = %pair.src_block.location(), sim, "Fused target dialogue");
            out.push(AlignedPair {
                tgt_text: fused_tgt,
                similarity: sim,
                ..pair
            });
            iter.next();
            continue;
        }

        let fused_src = format!("{} {}", pair.src_text, next.src_text);
        let sim = similarity.similarity(&fused_src, &pair.tgt_text).await;
        if sim >= accept {
            debug!(location = %pair.src_block.location(), sim, "Fused source dialogue");
            out.push(AlignedPair {
                src_text: fused_src,
                similarity: sim,
                ..pair
            });
            iter.next();
            continue;
        }

        out.push(pair);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Block;

    /// Scores exact text matches from a table, 0 otherwise
    struct TableSimilarity(Vec<(&'static str, &'static str, f64)>);

    #[async_trait]
    impl TextSimilarity for TableSimilarity {
        async fn similarity(&self, a: &str, b: &str) -> f64 {
            self.0
                .iter()
                .find(|(x, y, _)| *x == a && *y == b)
                .map(|(_, _, s)| *s)
                .unwrap_or(0.0)
        }
    }

    fn pair(src: &str, tgt: &str, i: usize, sim: f64) -> AlignedPair {
        let block = |text: &str| Block {
            text: text.to_string(),
            container_index: 0,
            block_index: i,
            sentence_index: 0,
            chapter_title: None,
        };
        AlignedPair::new(&block(src), &block(tgt), sim)
    }

    #[tokio::test]
    async fn test_fuses_split_target_dialogue() {
        let pairs = vec![
            pair("\"Come here. Now.\"", "- Venha cá.", 0, 0.5),
            pair("He left.", "- Agora.", 1, 0.4),
            pair("The end.", "O fim.", 2, 0.9),
        ];
        let sim = TableSimilarity(vec![("\"Come here. Now.\"", "- Venha cá. - Agora.", 0.69)]);

        let out = repair(pairs, 0.70, 0.02, &sim).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tgt_text, "- Venha cá. - Agora.");
        assert_eq!(out[0].tgt_block.block_index, 0);
        assert_eq!(out[0].similarity, 0.69);
        assert_eq!(out[1].src_text, "The end.");
    }

    #[tokio::test]
    async fn test_falls_back_to_source_fuse() {
        let pairs = vec![
            pair("\"Wait,\"", "- Espere, disse ela.", 0, 0.3),
            pair("she said.", "Silêncio.", 1, 0.2),
        ];
        let sim = TableSimilarity(vec![("\"Wait,\" she said.", "- Espere, disse ela.", 0.8)]);

        let out = repair(pairs, 0.70, 0.02, &sim).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].src_text, "\"Wait,\" she said.");
        assert_eq!(out[0].tgt_text, "- Espere, disse ela.");
    }

    #[tokio::test]
    async fn test_non_speech_and_rejected_fusions_kept() {
        let pairs = vec![
            pair("Plain narration.", "Narração simples.", 0, 0.1),
            pair("\"Hi\"", "- Oi", 1, 0.1),
            pair("Other.", "Outro.", 2, 0.1),
        ];
        let sim = TableSimilarity(vec![]);

        let out = repair(pairs.clone(), 0.70, 0.02, &sim).await;

        assert_eq!(out, pairs);
    }

    #[test]
    fn test_looks_like_speech() {
        assert!(looks_like_speech("\"Yes\"", "Sim"));
        assert!(looks_like_speech("Yes", "\u{2014} Sim"));
        assert!(looks_like_speech("Yes", "- Sim"));
        assert!(!looks_like_speech("Yes", "Sim"));
    }
}
