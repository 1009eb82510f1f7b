//! Dialogue-aware text normalization applied to every aligned pair
//!
//! Compatibility folding covers the characters that actually occur in
//! typeset books (ligatures, ellipsis, fullwidth forms, odd spaces). It is
//! not a full NFKC implementation.

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_DASH: Lazy<Regex> = Lazy::new(|| Regex::new("^(-|\u{2014})\\s*").expect("leading dash regex"));
static ELLIPSIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\.\.\.\s*").expect("ellipsis regex"));

/// Trim, fold compatibility characters, collapse whitespace
pub fn normalize(s: &str) -> String {
    let mut folded = String::with_capacity(s.len());
    for c in s.trim().chars() {
        fold_compat(c, &mut folded);
    }
    collapse_whitespace(&folded)
}

/// [`normalize`] plus quote/dash unification and removal of the leading speech dash
pub fn normalize_dialogue(s: &str) -> String {
    let base = normalize(s);
    let unified: String = base
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2014}' => '-',
            other => other,
        })
        .collect();

    let without_dash = LEADING_DASH.replace(&unified, "");
    let spaced = ELLIPSIS.replace_all(&without_dash, " ... ");
    collapse_whitespace(&spaced)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_compat(c: char, out: &mut String) {
    match c {
        '\u{2026}' => out.push_str("..."),
        '\u{FB00}' => out.push_str("ff"),
        '\u{FB01}' => out.push_str("fi"),
        '\u{FB02}' => out.push_str("fl"),
        '\u{FB03}' => out.push_str("ffi"),
        '\u{FB04}' => out.push_str("ffl"),
        '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => out.push(' '),
        '\u{200B}' | '\u{FEFF}' | '\u{00AD}' => {}
        // Fullwidth ASCII block maps onto printable ASCII
        '\u{FF01}'..='\u{FF5E}' => {
            out.push(char::from_u32(c as u32 - 0xFEE0).unwrap_or(c));
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_compat_and_spaces() {
        assert_eq!(normalize("  \u{FB01}ne\u{00A0}\u{00A0}day\u{FF01} "), "fine day!");
    }

    #[test]
    fn test_dialogue_strips_leading_dash() {
        assert_eq!(normalize_dialogue("\u{2014} Vem c\u{00E1}, disse ela."), "Vem c\u{00E1}, disse ela.");
        assert_eq!(normalize_dialogue("-Already?"), "Already?");
    }

    #[test]
    fn test_dialogue_unifies_quotes_keeps_apostrophes() {
        assert_eq!(
            normalize_dialogue("\u{00AB}It\u{2019}s late\u{00BB}, he said."),
            "\"It's late\", he said."
        );
    }

    #[test]
    fn test_dialogue_spaces_ellipsis() {
        assert_eq!(normalize_dialogue("Wait\u{2026}what"), "Wait ... what");
        assert_eq!(normalize_dialogue("So...   "), "So ...");
    }

    #[test]
    fn test_blank_stays_blank() {
        assert_eq!(normalize_dialogue(" \u{2014}  "), "");
    }
}
