//! Block cleanup and segmentation heuristics
//!
//! Applied per content document, in this order:
//! 1. [`clean_text`] - typographic quote/dash folding, whitespace collapse
//! 2. [`glue_dialogue`] - join a short speech-verb narration line to the speech that follows
//! 3. [`split_mixed_dialogue`] - split narration from the quoted speech it introduces
//! 4. [`looks_like_footer`] - drop page numbers and similar noise
//! 5. [`split_sentences`] - only at sentence granularity
//!
//! [`dedupe_consecutive`] then runs once over the whole book.

use super::Block;
use once_cell::sync::Lazy;
use regex::Regex;

/// Narration longer than this is never glued
const SHORT_NARRATION_MAX_CHARS: usize = 80;
/// Minimum narration kept before a split point
const SPLIT_MIN_BEFORE_CHARS: usize = 8;
/// Minimum speech kept after a split point
const SPLIT_MIN_AFTER_CHARS: usize = 4;
/// Blocks this short are treated as page furniture
const FOOTER_MAX_CHARS: usize = 5;

/// Double-quote characters that can open speech
const DOUBLE_QUOTES: [char; 5] = ['"', '\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'];
/// Characters after which a quote counts as opening speech
const QUOTE_LEFT_BOUNDARY: &str = ".!?\u{2026}\u{2014}-;:()[]{}";

static SPEECH_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(said|asked|looked|replied|whispered|shouted|murmured|muttered|yelled|cried|disse|perguntou|olhou|respondeu|sussurrou|gritou|murmurou|resmungou|berrou|exclamou)\b",
    )
    .expect("speech verb regex")
});

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new("[.!?\u{2026}]\\s+").expect("sentence end regex"));

/// Fold typographic quotes and en dashes, keep em dashes, collapse whitespace
pub fn clean_text(s: &str) -> String {
    let folded: String = s
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' => '-',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Block opens with a dash or a double quote
pub fn looks_like_speech_lead(s: &str) -> bool {
    let t = s.trim_start();
    t.starts_with('\u{2014}') || t.starts_with('-') || t.starts_with('"') || t.starts_with('\u{201C}')
}

/// Short block containing a speech verb ("she said", "perguntou ele")
pub fn looks_like_short_narration(s: &str) -> bool {
    let t = s.trim();
    t.chars().count() <= SHORT_NARRATION_MAX_CHARS && SPEECH_VERB.is_match(t)
}

/// Join each short narration block with an immediately following speech block
pub fn glue_dialogue(blocks: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(blocks.len());
    let mut iter = blocks.into_iter().peekable();

    while let Some(cur) = iter.next() {
        if looks_like_short_narration(&cur) && iter.peek().is_some_and(|n| looks_like_speech_lead(n)) {
            if let Some(next) = iter.next() {
                out.push(format!("{} {}", cur, next));
                continue;
            }
        }
        out.push(cur);
    }

    out
}

/// Byte offset of the first double quote that opens speech, if any
fn first_speech_quote(t: &str) -> Option<usize> {
    let mut prev: Option<char> = None;
    for (idx, c) in t.char_indices() {
        if DOUBLE_QUOTES.contains(&c) {
            let boundary = match prev {
                None => true,
                Some(p) => p.is_whitespace() || QUOTE_LEFT_BOUNDARY.contains(p),
            };
            if boundary {
                return Some(idx);
            }
        }
        prev = Some(c);
    }
    None
}

/// Split "He turned. "Where are you going?"" into narration and speech
pub fn split_mixed_dialogue(blocks: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(blocks.len() + 8);

    for block in blocks {
        let t = block.trim();
        if t.is_empty() || looks_like_speech_lead(t) || !t.contains(DOUBLE_QUOTES) {
            out.push(block);
            continue;
        }

        match first_speech_quote(t) {
            Some(idx) if idx > 0 => {
                let before = t[..idx].trim();
                let after = t[idx..].trim();
                if before.chars().count() >= SPLIT_MIN_BEFORE_CHARS
                    && after.chars().count() >= SPLIT_MIN_AFTER_CHARS
                {
                    out.push(before.to_string());
                    out.push(after.to_string());
                } else {
                    out.push(block);
                }
            }
            _ => out.push(block),
        }
    }

    out
}

/// Page numbers, running heads and other short or digit-only lines
pub fn looks_like_footer(s: &str) -> bool {
    s.chars().count() <= FOOTER_MAX_CHARS || s.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
}

/// Split after `.`, `!`, `?` or `…` followed by whitespace; empty pieces dropped
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        // Cut right after the punctuation character, drop the whitespace run
        let punct_len = text[m.start()..].chars().next().map_or(1, char::len_utf8);
        push_sentence(&mut out, &text[start..m.start() + punct_len]);
        start = m.end();
    }
    push_sentence(&mut out, &text[start..]);

    out
}

fn push_sentence(out: &mut Vec<String>, piece: &str) {
    let cleaned = clean_text(piece);
    if !cleaned.is_empty() {
        out.push(cleaned);
    }
}

/// Drop a block whose text equals the block right before it
pub fn dedupe_consecutive(blocks: Vec<Block>) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if out.last().is_some_and(|prev| prev.text == block.text) {
            continue;
        }
        out.push(block);
    }
    out
}
