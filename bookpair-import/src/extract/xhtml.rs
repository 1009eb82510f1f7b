//! Leaf block collection from XHTML content documents
//!
//! A block is the text of a `p`, `li` or `div` element that has no `p`, `li`
//! or `div` descendant of its own, in document order. Inline markup is
//! flattened; `br` becomes a space. Text under `head`, `script` and `style`
//! is ignored.

use super::ExtractError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

const BLOCK_ELEMENTS: [&str; 3] = ["p", "li", "div"];
const SKIPPED_ELEMENTS: [&str; 3] = ["head", "script", "style"];

struct OpenBlock {
    name: String,
    text: String,
    has_block_child: bool,
}

/// Raw (uncleaned) text of each leaf block, in document order
pub fn collect_block_texts(markup: &[u8], entry: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(markup);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut out = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|e| ExtractError::Xml {
            entry: entry.to_string(),
            message: e.to_string(),
        })?;

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e);
                if SKIPPED_ELEMENTS.contains(&name.as_str()) {
                    skip_depth += 1;
                } else if BLOCK_ELEMENTS.contains(&name.as_str()) {
                    if let Some(parent) = stack.last_mut() {
                        parent.has_block_child = true;
                    }
                    stack.push(OpenBlock {
                        name,
                        text: String::new(),
                        has_block_child: false,
                    });
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if name == "br" {
                    append_text(&mut stack, " ");
                } else if BLOCK_ELEMENTS.contains(&name.as_str()) {
                    // An empty block still makes its parent non-leaf
                    if let Some(parent) = stack.last_mut() {
                        parent.has_block_child = true;
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                if SKIPPED_ELEMENTS.contains(&name.as_str()) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if stack.last().is_some_and(|top| top.name == name) {
                    if let Some(block) = stack.pop() {
                        if !block.has_block_child && !block.text.trim().is_empty() {
                            out.push(block.text);
                        }
                    }
                }
            }
            Event::Text(t) if skip_depth == 0 => {
                let raw = String::from_utf8_lossy(&t);
                append_text(&mut stack, &decode_entities(&raw));
            }
            Event::CData(t) if skip_depth == 0 => {
                append_text(&mut stack, &String::from_utf8_lossy(&t));
            }
            _ => {}
        }
    }

    // Unclosed blocks at end of document still count
    while let Some(block) = stack.pop() {
        if !block.has_block_child && !block.text.trim().is_empty() {
            out.push(block.text);
        }
    }

    Ok(out)
}

/// Lowercased local element name, namespace prefix dropped
pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

/// Attribute value by local name, entity-decoded
pub(crate) fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref().eq_ignore_ascii_case(name.as_bytes()) {
            let raw = String::from_utf8_lossy(&attr.value);
            Some(decode_entities(&raw).into_owned())
        } else {
            None
        }
    })
}

/// Resolve XML and common HTML entities; undecodable input is kept verbatim
pub(crate) fn decode_entities(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape_with(raw, resolve_entity).unwrap_or(Cow::Borrowed(raw))
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    Some(match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{00A0}",
        "shy" => "",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "laquo" => "\u{00AB}",
        "raquo" => "\u{00BB}",
        "copy" => "\u{00A9}",
        _ => return None,
    })
}

fn append_text(stack: &mut [OpenBlock], text: &str) {
    for block in stack.iter_mut() {
        block.text.push_str(text);
    }
}
