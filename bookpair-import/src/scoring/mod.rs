//! Pair scoring signals
//!
//! - [`normalize`] - dialogue-aware text normalization applied before scoring
//! - [`quality_filter`] - length-ratio and placeholder rules
//! - [`composer`] - final score and status thresholds
//! - [`chrf`] - character n-gram F-score for back-translation checks

pub mod chrf;
pub mod composer;
pub mod normalize;
pub mod quality_filter;

pub use composer::{normalize_qe, ScoreComposer};
pub use quality_filter::{gate, length_ratio, placeholders_preserved, quality_score, GateDecision};
