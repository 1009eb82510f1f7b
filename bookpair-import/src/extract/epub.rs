//! EPUB container reading
//!
//! **Algorithm:**
//! 1. Load every ZIP entry into memory
//! 2. `META-INF/container.xml` → first `rootfile/@full-path` (the OPF package)
//! 3. OPF `manifest` (id → href, media type, properties) and `spine` (ordered idrefs)
//! 4. Chapter titles from the EPUB3 `nav` document, else the EPUB2 NCX `navMap`
//! 5. One [`Section`] per XHTML spine item; every spine item advances the spine index

use super::xhtml::{attribute, local_name};
use super::ExtractError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const XHTML_MEDIA_TYPES: [&str; 2] = ["application/xhtml+xml", "text/html"];
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
/// Upper bound on buffer preallocation from a declared entry size
const MAX_PREALLOC: u64 = 1 << 20;

/// An EPUB archive loaded into memory
pub struct EpubBook {
    entries: HashMap<String, Vec<u8>>,
}

/// One XHTML content document in spine order
#[derive(Debug, Clone)]
pub struct Section {
    pub spine_index: usize,
    /// Archive path of the document
    pub href: String,
    pub chapter_title: String,
    pub markup: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ManifestItem {
    path: String,
    media_type: String,
    properties: String,
}

#[derive(Debug, Default)]
struct Package {
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
    toc_id: Option<String>,
}

/// Declared sizes come from the archive header and are not trusted
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

impl EpubBook {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = HashMap::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(initial_capacity(file.size()));
            file.read_to_end(&mut data)?;
            entries.insert(file.name().to_string(), data);
        }
        Ok(Self { entries })
    }

    fn entry(&self, path: &str) -> Result<&[u8], ExtractError> {
        self.entries
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| ExtractError::MissingEntry(path.to_string()))
    }

    /// Content documents in spine order with their chapter titles
    pub fn sections(&self) -> Result<Vec<Section>, ExtractError> {
        let opf_path = self.package_path()?;
        let package = parse_package(self.entry(&opf_path)?, &opf_path)?;
        let titles = self.chapter_titles(&package);

        let mut sections = Vec::new();
        for (spine_index, idref) in package.spine.iter().enumerate() {
            let Some(item) = package.manifest.get(idref) else {
                warn!(idref = %idref, "Spine references unknown manifest item");
                continue;
            };
            if !XHTML_MEDIA_TYPES.contains(&item.media_type.as_str()) {
                continue;
            }
            let markup = self.entry(&item.path)?.to_vec();
            let chapter_title = titles
                .get(&item.path)
                .cloned()
                .unwrap_or_else(|| format!("spine-{}", spine_index));
            sections.push(Section {
                spine_index,
                href: item.path.clone(),
                chapter_title,
                markup,
            });
        }

        debug!(
            spine_items = package.spine.len(),
            sections = sections.len(),
            toc_entries = titles.len(),
            "Read EPUB spine"
        );
        Ok(sections)
    }

    fn package_path(&self) -> Result<String, ExtractError> {
        let container = self.entry(CONTAINER_PATH)?;
        let mut reader = Reader::from_reader(container);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_event_into(&mut buf).map_err(|e| xml_error(CONTAINER_PATH, e))? {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) if local_name(&e) == "rootfile" => {
                    if let Some(path) = attribute(&e, "full-path") {
                        return Ok(path);
                    }
                }
                _ => {}
            }
        }
        Err(ExtractError::Malformed(format!("{} has no rootfile", CONTAINER_PATH)))
    }

    /// Archive path → TOC title. Unreadable TOCs yield an empty map.
    fn chapter_titles(&self, package: &Package) -> HashMap<String, String> {
        let nav = package
            .manifest
            .values()
            .find(|item| item.properties.split_whitespace().any(|p| p == "nav"));
        let ncx = package
            .toc_id
            .as_ref()
            .and_then(|id| package.manifest.get(id))
            .or_else(|| package.manifest.values().find(|item| item.media_type == NCX_MEDIA_TYPE));

        let parsed = match (nav, ncx) {
            (Some(item), _) => self.entry(&item.path).and_then(|b| parse_nav(b, &item.path)),
            (None, Some(item)) => self.entry(&item.path).and_then(|b| parse_ncx(b, &item.path)),
            (None, None) => Ok(HashMap::new()),
        };

        parsed.unwrap_or_else(|e| {
            warn!(error = %e, "Table of contents unreadable, using spine-N titles");
            HashMap::new()
        })
    }
}

fn xml_error(entry: &str, e: quick_xml::Error) -> ExtractError {
    ExtractError::Xml {
        entry: entry.to_string(),
        message: e.to_string(),
    }
}

fn parse_package(bytes: &[u8], opf_path: &str) -> Result<Package, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut package = Package::default();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(opf_path, e))? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => match local_name(&e).as_str() {
                "item" => {
                    let (Some(id), Some(href)) = (attribute(&e, "id"), attribute(&e, "href")) else {
                        continue;
                    };
                    package.manifest.insert(
                        id,
                        ManifestItem {
                            path: resolve_href(opf_path, &href),
                            media_type: attribute(&e, "media-type").unwrap_or_default(),
                            properties: attribute(&e, "properties").unwrap_or_default(),
                        },
                    );
                }
                "itemref" => {
                    if let Some(idref) = attribute(&e, "idref") {
                        package.spine.push(idref);
                    }
                }
                "spine" => package.toc_id = attribute(&e, "toc"),
                _ => {}
            },
            _ => {}
        }
    }

    if package.spine.is_empty() {
        return Err(ExtractError::Malformed(format!("{} has an empty spine", opf_path)));
    }
    Ok(package)
}

/// EPUB3 navigation document: `<a href>` text inside `<nav>`
fn parse_nav(bytes: &[u8], nav_path: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();
    let mut titles = HashMap::new();
    let mut nav_depth = 0usize;
    let mut anchor: Option<(String, String)> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(nav_path, e))? {
            Event::Eof => break,
            Event::Start(e) => match local_name(&e).as_str() {
                "nav" => nav_depth += 1,
                "a" if nav_depth > 0 => {
                    anchor = attribute(&e, "href").map(|href| (href, String::new()));
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some((_, text)) = anchor.as_mut() {
                    text.push_str(&super::xhtml::decode_entities(&String::from_utf8_lossy(&t)));
                }
            }
            Event::End(e) => match String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase().as_str() {
                "nav" => nav_depth = nav_depth.saturating_sub(1),
                "a" => {
                    if let Some((href, text)) = anchor.take() {
                        insert_title(&mut titles, nav_path, &href, &text);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    Ok(titles)
}

/// EPUB2 NCX: `navLabel/text` followed by `content/@src`
fn parse_ncx(bytes: &[u8], ncx_path: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut titles = HashMap::new();
    let mut in_label_text = false;
    let mut label = String::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(|e| xml_error(ncx_path, e))? {
            Event::Eof => break,
            Event::Start(e) if local_name(&e) == "navlabel" => label.clear(),
            Event::Start(e) if local_name(&e) == "text" => in_label_text = true,
            Event::Start(e) | Event::Empty(e) if local_name(&e) == "content" => {
                if let Some(src) = attribute(&e, "src") {
                    insert_title(&mut titles, ncx_path, &src, &label);
                }
            }
            Event::Text(t) if in_label_text => {
                label.push_str(&super::xhtml::decode_entities(&String::from_utf8_lossy(&t)));
            }
            Event::End(e) if e.local_name().as_ref().eq_ignore_ascii_case(b"text") => {
                in_label_text = false
            }
            _ => {}
        }
    }

    Ok(titles)
}

/// First title per document wins; blank titles are ignored
fn insert_title(titles: &mut HashMap<String, String>, toc_path: &str, href: &str, text: &str) {
    let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return;
    }
    titles.entry(resolve_href(toc_path, href)).or_insert(title);
}

/// Resolve `href` relative to the directory of `base_path`: fragment
/// dropped, percent-escapes decoded, `.`/`..` segments folded.
pub(crate) fn resolve_href(base_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = percent_decode(href);

    let mut segments: Vec<&str> = match base_path.rfind('/') {
        Some(pos) if !href.starts_with('/') => base_path[..pos].split('/').collect(),
        _ => Vec::new(),
    };
    for part in href.trim_start_matches('/').split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
