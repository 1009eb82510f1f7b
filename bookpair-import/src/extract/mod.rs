//! Text block extraction from EPUB books
//!
//! Produces an ordered list of [`Block`]s with stable position metadata:
//! container (spine) index, block index within the container, and sentence
//! index within the block.
//!
//! **Pipeline:**
//! 1. [`epub`] - open the ZIP, resolve the OPF package, walk the spine, map TOC titles
//! 2. [`xhtml`] - collect leaf block-level text from each XHTML content document
//! 3. [`segment`] - dialogue glue/split, footer removal, dedupe, sentence split

pub mod epub;
pub mod segment;
pub mod xhtml;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use epub::EpubBook;

/// Extraction errors. All of them abort the import.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a readable EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML in {entry}: {message}")]
    Xml { entry: String, message: String },

    #[error("Missing archive entry: {0}")]
    MissingEntry(String),

    #[error("Malformed EPUB: {0}")]
    Malformed(String),
}

/// One extracted unit of text with its position in the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    /// Spine position (every spine item counts, XHTML or not)
    pub container_index: usize,
    /// Position within the container, counted before footer removal
    pub block_index: usize,
    /// Position within the block; always 0 at paragraph granularity
    pub sentence_index: usize,
    /// Table-of-contents title, or `spine-<n>` when the TOC has none
    pub chapter_title: Option<String>,
}

impl Block {
    /// `spine=X;block=Y;sent=Z`
    pub fn location(&self) -> String {
        format!(
            "spine={};block={};sent={}",
            self.container_index, self.block_index, self.sentence_index
        )
    }
}

/// Extraction unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Paragraph,
    Sentence,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paragraph" => Ok(Granularity::Paragraph),
            "sentence" => Ok(Granularity::Sentence),
            other => Err(format!("unknown granularity '{}' (expected paragraph|sentence)", other)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Paragraph => write!(f, "paragraph"),
            Granularity::Sentence => write!(f, "sentence"),
        }
    }
}

/// Extract blocks from an EPUB file on disk
pub fn extract_blocks(path: &Path, granularity: Granularity) -> Result<Vec<Block>, ExtractError> {
    let book = EpubBook::open(path)?;
    extract_from_book(&book, granularity)
}

/// Extract blocks from an in-memory EPUB archive
pub fn extract_blocks_from_bytes(
    bytes: &[u8],
    granularity: Granularity,
) -> Result<Vec<Block>, ExtractError> {
    let book = EpubBook::from_bytes(bytes.to_vec())?;
    extract_from_book(&book, granularity)
}

fn extract_from_book(book: &EpubBook, granularity: Granularity) -> Result<Vec<Block>, ExtractError> {
    let mut blocks = Vec::new();

    for section in book.sections()? {
        let raw = xhtml::collect_block_texts(&section.markup, &section.href)?;
        let cleaned: Vec<String> = raw.iter().map(|t| segment::clean_text(t)).collect();
        let glued = segment::glue_dialogue(cleaned);
        let split = segment::split_mixed_dialogue(glued);

        for (block_index, text) in split.into_iter().enumerate() {
            if segment::looks_like_footer(&text) {
                continue;
            }
            let units = match granularity {
                Granularity::Paragraph => vec![text],
                Granularity::Sentence => segment::split_sentences(&text),
            };
            for (sentence_index, unit) in units.into_iter().enumerate() {
                blocks.push(Block {
                    text: unit,
                    container_index: section.spine_index,
                    block_index,
                    sentence_index,
                    chapter_title: Some(section.chapter_title.clone()),
                });
            }
        }
    }

    let blocks = segment::dedupe_consecutive(blocks);
    tracing::debug!(
        blocks = blocks.len(),
        granularity = %granularity,
        "Extracted blocks"
    );
    Ok(blocks)
}
