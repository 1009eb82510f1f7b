//! Rule-based pair quality: length ratio and placeholder preservation
//!
//! Pure functions, no I/O. Lengths are counted in characters.

use once_cell::sync::Lazy;
use regex::Regex;

/// `{name}`, `%s`, `%d`, `<tag>`, `${name}`
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\{[^}]+\}|%s|%d|<[^>]+>|\$\{[^}]+\})").expect("placeholder regex"));

const RATIO_WEIGHT: f64 = 0.7;
const PLACEHOLDER_WEIGHT: f64 = 0.3;

/// `max(1, len(tgt)) / max(1, len(src))`
pub fn length_ratio(src: &str, tgt: &str) -> f64 {
    let src_len = src.chars().count().max(1) as f64;
    let tgt_len = tgt.chars().count().max(1) as f64;
    tgt_len / src_len
}

/// Every placeholder token in `src` appears verbatim in `tgt`
pub fn placeholders_preserved(src: &str, tgt: &str) -> bool {
    PLACEHOLDER.find_iter(src).all(|m| tgt.contains(m.as_str()))
}

/// `0.7 * ratio_score + 0.3 * placeholder_score`, rounded to 3 decimals.
///
/// `ratio_score` is 1.0 at ratio 1, falls linearly to 0 at each bound,
/// and is 0 at or beyond either bound.
pub fn quality_score(ratio: f64, placeholders_ok: bool, ratio_min: f64, ratio_max: f64) -> f64 {
    let ratio_score = if ratio <= ratio_min || ratio >= ratio_max {
        0.0
    } else if ratio <= 1.0 {
        1.0 - (1.0 - ratio) / (1.0 - ratio_min)
    } else {
        1.0 - (ratio - 1.0) / (ratio_max - 1.0)
    }
    .clamp(0.0, 1.0);

    let placeholder_score = if placeholders_ok { 1.0 } else { 0.0 };
    let q = RATIO_WEIGHT * ratio_score + PLACEHOLDER_WEIGHT * placeholder_score;
    (q * 1000.0).round() / 1000.0
}

/// Outcome of the cheap gate applied before any oracle call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Accept { ratio: f64, quality: f64 },
    RatioOutOfBounds { ratio: f64 },
    PlaceholdersLost,
}

/// Gate a pair on ratio bounds and placeholders, scoring it when it passes
pub fn gate(src: &str, tgt: &str, ratio_min: f64, ratio_max: f64) -> GateDecision {
    let ratio = length_ratio(src, tgt);
    if ratio < ratio_min || ratio > ratio_max {
        return GateDecision::RatioOutOfBounds { ratio };
    }
    if !placeholders_preserved(src, tgt) {
        return GateDecision::PlaceholdersLost;
    }
    GateDecision::Accept {
        ratio,
        quality: quality_score(ratio, true, ratio_min, ratio_max),
    }
}
