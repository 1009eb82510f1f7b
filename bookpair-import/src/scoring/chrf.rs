//! chrF: character n-gram F-score
//!
//! n = 1..6, β = 2, precision and recall averaged over n before the F
//! combination. Inputs are whitespace-collapsed and lowercased. Scale 0..100,
//! rounded to 2 decimals.

use std::collections::HashMap;

const MAX_ORDER: usize = 6;
const BETA_SQUARED: f64 = 4.0;

pub fn chrf(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<char> = normalize(reference).chars().collect();
    let hypothesis: Vec<char> = normalize(hypothesis).chars().collect();

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;

    for n in 1..=MAX_ORDER {
        let ref_grams = ngrams(&reference, n);
        let hyp_grams = ngrams(&hypothesis, n);

        let overlap: usize = hyp_grams
            .iter()
            .map(|(gram, &count)| count.min(ref_grams.get(gram).copied().unwrap_or(0)))
            .sum();
        let hyp_total: usize = hyp_grams.values().sum();
        let ref_total: usize = ref_grams.values().sum();

        if hyp_total > 0 {
            precision_sum += overlap as f64 / hyp_total as f64;
        }
        if ref_total > 0 {
            recall_sum += overlap as f64 / ref_total as f64;
        }
    }

    let precision = precision_sum / MAX_ORDER as f64;
    let recall = recall_sum / MAX_ORDER as f64;
    if precision + recall == 0.0 {
        return 0.0;
    }

    let f = (1.0 + BETA_SQUARED) * precision * recall / (recall + BETA_SQUARED * precision);
    (f * 10000.0).round() / 100.0
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn ngrams(chars: &[char], n: usize) -> HashMap<&[char], usize> {
    let mut grams = HashMap::new();
    if chars.len() < n {
        return grams;
    }
    for window in chars.windows(n) {
        *grams.entry(window).or_insert(0) += 1;
    }
    grams
}
