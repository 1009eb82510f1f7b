//! Block alignment between two editions of a book
//!
//! Two strategies behind the [`Aligner`] trait, selected by [`AlignMode`]:
//! - [`PositionalAligner`] - pairs blocks by index, no oracle calls
//! - [`OptimalAligner`] - embedding cost matrix solved by Kuhn–Munkres,
//!   followed by [`repair`] of weak dialogue pairs

pub mod optimal;
pub mod positional;
pub mod repair;
pub mod vector;

use crate::config::AlignmentConfig;
use crate::extract::Block;
use crate::oracle::EmbeddingOracle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use optimal::OptimalAligner;
pub use positional::PositionalAligner;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Assignment solver task failed: {0}")]
    Solver(#[from] tokio::task::JoinError),
}

/// One source/target correspondence.
///
/// Texts may differ from the blocks' own text when the repairer fused
/// neighbouring blocks; positions always come from the first fused block.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub src_text: String,
    pub src_block: Block,
    pub tgt_text: String,
    pub tgt_block: Block,
    /// 0.0 for positional pairs
    pub similarity: f64,
}

impl AlignedPair {
    pub fn new(src: &Block, tgt: &Block, similarity: f64) -> Self {
        Self {
            src_text: src.text.clone(),
            src_block: src.clone(),
            tgt_text: tgt.text.clone(),
            tgt_block: tgt.clone(),
            similarity,
        }
    }
}

/// Aligned pairs plus how many embedding chunks were degraded on the way
#[derive(Debug, Clone, Default)]
pub struct Alignment {
    pub pairs: Vec<AlignedPair>,
    /// Pairs left below `min_similarity` after repair
    pub dropped: usize,
    pub degraded_chunks: usize,
}

#[async_trait]
pub trait Aligner: Send + Sync {
    async fn align(&self, src: &[Block], tgt: &[Block]) -> Result<Alignment, AlignError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    #[default]
    #[serde(alias = "length")]
    Positional,
    #[serde(alias = "embedding")]
    Optimal,
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" | "length" => Ok(AlignMode::Positional),
            "optimal" | "embedding" => Ok(AlignMode::Optimal),
            other => Err(format!("unknown align mode '{}' (expected positional|optimal)", other)),
        }
    }
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignMode::Positional => write!(f, "positional"),
            AlignMode::Optimal => write!(f, "optimal"),
        }
    }
}

/// Build the aligner for `mode`
pub fn build_aligner(
    mode: AlignMode,
    embedder: Arc<dyn EmbeddingOracle>,
    config: &AlignmentConfig,
) -> Box<dyn Aligner> {
    match mode {
        AlignMode::Positional => Box::new(PositionalAligner),
        AlignMode::Optimal => Box::new(OptimalAligner::new(embedder, config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_mode_parse_and_aliases() {
        assert_eq!("positional".parse::<AlignMode>().unwrap(), AlignMode::Positional);
        assert_eq!("Length".parse::<AlignMode>().unwrap(), AlignMode::Positional);
        assert_eq!("optimal".parse::<AlignMode>().unwrap(), AlignMode::Optimal);
        assert_eq!("embedding".parse::<AlignMode>().unwrap(), AlignMode::Optimal);
        assert!("fuzzy".parse::<AlignMode>().is_err());
        assert_eq!(AlignMode::Optimal.to_string(), "optimal");
    }
}
