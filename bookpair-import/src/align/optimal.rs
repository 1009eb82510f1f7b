//! Optimal one-to-one block assignment
//!
//! **Cost of pairing source block i with target block j:**
//! - forbidden when `|container_i - container_j| > spine_band`
//! - otherwise `w_sim * (1 - sim_blend) + w_pos * pos_penalty` where
//!   - `sim_blend = clamp01(0.7 * cos(unit) + 0.3 * cos(context))`
//!   - `pos_penalty = 0.6 * chapter_mismatch + 0.3 * min(|Δspine|, 10) / 10
//!     + 0.1 * min(|Δblock|, 30) / 30`
//!
//! The context text of a block is its previous, own and next block text
//! joined by spaces. The N×M matrix is padded square with zero-cost cells and
//! solved with Kuhn–Munkres on a blocking thread. Matched forbidden cells and
//! padding are discarded, weak dialogue pairs are repaired, and anything still
//! below `min_similarity` is dropped.

use super::repair::{repair, EmbeddingSimilarity};
use super::vector::{clamp01, cosine};
use super::{AlignError, AlignedPair, Aligner, Alignment};
use crate::config::AlignmentConfig;
use crate::extract::Block;
use crate::oracle::EmbeddingOracle;
use async_trait::async_trait;
use pathfinding::kuhn_munkres::{kuhn_munkres_min, Weights};
use std::sync::Arc;
use tracing::{debug, info};

const UNIT_WEIGHT: f64 = 0.7;
const CONTEXT_WEIGHT: f64 = 0.3;

/// Integer scale applied to costs for the solver
const COST_SCALE: f64 = 1_000_000.0;
/// Cost of a forbidden cell; real costs never exceed `COST_SCALE`
const FORBIDDEN: i64 = 1_000_000_000;

pub struct OptimalAligner {
    embedder: Arc<dyn EmbeddingOracle>,
    config: AlignmentConfig,
}

impl OptimalAligner {
    pub fn new(embedder: Arc<dyn EmbeddingOracle>, config: AlignmentConfig) -> Self {
        Self { embedder, config }
    }

    /// Unit and context vectors for one side
    async fn embed_side(&self, blocks: &[Block]) -> (Vec<Vec<f32>>, Vec<Vec<f32>>, usize) {
        let units: Vec<String> = blocks.iter().map(|b| b.text.clone()).collect();
        let contexts = context_texts(blocks);

        let unit = self.embedder.embed(&units).await;
        let ctx = self.embedder.embed(&contexts).await;
        let degraded = unit.degraded_chunks.len() + ctx.degraded_chunks.len();
        (unit.values, ctx.values, degraded)
    }
}

#[async_trait]
impl Aligner for OptimalAligner {
    async fn align(&self, src: &[Block], tgt: &[Block]) -> Result<Alignment, AlignError> {
        if src.is_empty() || tgt.is_empty() {
            return Ok(Alignment::default());
        }

        let (src_unit, src_ctx, src_degraded) = self.embed_side(src).await;
        let (tgt_unit, tgt_ctx, tgt_degraded) = self.embed_side(tgt).await;

        let src_owned = src.to_vec();
        let tgt_owned = tgt.to_vec();
        let config = self.config.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let matrix = CostMatrix::build(
                &src_owned, &tgt_owned, &src_unit, &src_ctx, &tgt_unit, &tgt_ctx, &config,
            );
            matrix.solve()
        })
        .await?;

        let pairs: Vec<AlignedPair> = matches
            .into_iter()
            .map(|(i, j, sim)| AlignedPair::new(&src[i], &tgt[j], sim))
            .collect();
        let assigned = pairs.len();

        let similarity = EmbeddingSimilarity::new(Arc::clone(&self.embedder));
        let repaired = repair(
            pairs,
            self.config.min_similarity,
            self.config.repair_slack,
            &similarity,
        )
        .await;
        let repaired_len = repaired.len();
        let pairs: Vec<AlignedPair> = repaired
            .into_iter()
            .filter(|p| p.similarity >= self.config.min_similarity)
            .collect();
        let dropped = repaired_len - pairs.len();

        info!(
            src_blocks = src.len(),
            tgt_blocks = tgt.len(),
            assigned,
            kept = pairs.len(),
            dropped,
            "Optimal alignment complete"
        );

        Ok(Alignment {
            pairs,
            dropped,
            degraded_chunks: src_degraded + tgt_degraded + similarity.degraded_chunks(),
        })
    }
}

/// `{prev, cur, next}` texts joined by a space
fn context_texts(blocks: &[Block]) -> Vec<String> {
    (0..blocks.len())
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(blocks.len() - 1);
            blocks[lo..=hi]
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn chapter_mismatch(a: &Block, b: &Block) -> f64 {
    match (&a.chapter_title, &b.chapter_title) {
        (Some(x), Some(y)) if x.to_lowercase() != y.to_lowercase() => 1.0,
        _ => 0.0,
    }
}

fn position_penalty(a: &Block, b: &Block) -> f64 {
    let spine = a.container_index.abs_diff(b.container_index).min(10) as f64 / 10.0;
    let block = a.block_index.abs_diff(b.block_index).min(30) as f64 / 30.0;
    0.6 * chapter_mismatch(a, b) + 0.3 * spine + 0.1 * block
}

/// Square integer cost matrix for the assignment solver
struct CostMatrix {
    size: usize,
    rows: usize,
    columns: usize,
    costs: Vec<i64>,
    /// Blended similarity per real cell, for reporting matched pairs
    similarity: Vec<f64>,
}

impl CostMatrix {
    #[allow(clippy::too_many_arguments)]
    fn build(
        src: &[Block],
        tgt: &[Block],
        src_unit: &[Vec<f32>],
        src_ctx: &[Vec<f32>],
        tgt_unit: &[Vec<f32>],
        tgt_ctx: &[Vec<f32>],
        config: &AlignmentConfig,
    ) -> Self {
        let (rows, columns) = (src.len(), tgt.len());
        let size = rows.max(columns);
        let mut costs = vec![0i64; size * size];
        let mut similarity = vec![0.0f64; rows * columns];
        let mut forbidden = 0usize;

        for (i, s) in src.iter().enumerate() {
            for (j, t) in tgt.iter().enumerate() {
                if s.container_index.abs_diff(t.container_index) > config.spine_band {
                    costs[i * size + j] = FORBIDDEN;
                    forbidden += 1;
                    continue;
                }
                let sim = clamp01(
                    UNIT_WEIGHT * cosine(&src_unit[i], &tgt_unit[j])
                        + CONTEXT_WEIGHT * cosine(&src_ctx[i], &tgt_ctx[j]),
                );
                let cost = config.weight_similarity * (1.0 - sim)
                    + config.weight_position * position_penalty(s, t);
                costs[i * size + j] = (cost.max(0.0) * COST_SCALE).round() as i64;
                similarity[i * columns + j] = sim;
            }
        }

        debug!(rows, columns, forbidden, "Cost matrix built");
        Self {
            size,
            rows,
            columns,
            costs,
            similarity,
        }
    }

    /// Matched real, allowed cells as `(row, column, similarity)`, by row
    fn solve(&self) -> Vec<(usize, usize, f64)> {
        let (_, assignment) = kuhn_munkres_min(self);
        assignment
            .into_iter()
            .enumerate()
            .filter(|&(i, j)| i < self.rows && j < self.columns && self.at(i, j) < FORBIDDEN)
            .map(|(i, j)| (i, j, self.similarity[i * self.columns + j]))
            .collect()
    }
}

impl Weights<i64> for CostMatrix {
    fn rows(&self) -> usize {
        self.size
    }

    fn columns(&self) -> usize {
        self.size
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.costs[row * self.size + col]
    }

    fn neg(&self) -> Self {
        Self {
            size: self.size,
            rows: self.rows,
            columns: self.columns,
            costs: self.costs.iter().map(|&c| -c).collect(),
            similarity: self.similarity.clone(),
        }
    }
}
