//! Index-based alignment

use super::{AlignError, AlignedPair, Aligner, Alignment};
use crate::extract::Block;
use async_trait::async_trait;

/// Pairs `src[i]` with `tgt[i]` for `i < min(N, M)`, similarity 0.0
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalAligner;

#[async_trait]
impl Aligner for PositionalAligner {
    async fn align(&self, src: &[Block], tgt: &[Block]) -> Result<Alignment, AlignError> {
        let pairs = src
            .iter()
            .zip(tgt)
            .map(|(s, t)| AlignedPair::new(s, t, 0.0))
            .collect();
        Ok(Alignment {
            pairs,
            dropped: 0,
            degraded_chunks: 0,
        })
    }
}
