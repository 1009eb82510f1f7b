//! Shared fixtures for bookpair-import integration tests
//!
//! - [`EpubFixture`] writes minimal EPUB3 archives (container, OPF, nav, XHTML)
//! - [`MarkerEmbedder`] / [`FixedQe`] stand in for the HTTP oracles
//! - [`create_test_db`] opens a file-backed database in a temp dir

#![allow(dead_code)]

use async_trait::async_trait;
use bookpair_import::config::ImportConfig;
use bookpair_import::db;
use bookpair_import::import::ImportOrchestrator;
use bookpair_import::oracle::{BatchOutcome, EmbeddingOracle, QualityEstimator, TranslationPair};
use sqlx::SqlitePool;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One chapter: TOC title plus its paragraphs
#[derive(Debug, Clone)]
pub struct Chapter {
    pub title: String,
    pub paragraphs: Vec<String>,
}

impl Chapter {
    pub fn new(title: &str, paragraphs: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Minimal EPUB3 builder
#[derive(Debug, Clone, Default)]
pub struct EpubFixture {
    chapters: Vec<Chapter>,
    with_nav: bool,
}

impl EpubFixture {
    pub fn new() -> Self {
        Self {
            chapters: Vec::new(),
            with_nav: true,
        }
    }

    pub fn chapter(mut self, title: &str, paragraphs: &[&str]) -> Self {
        self.chapters.push(Chapter::new(title, paragraphs));
        self
    }

    /// Leave out the navigation document (titles fall back to `spine-N`)
    pub fn without_nav(mut self) -> Self {
        self.with_nav = false;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        let mut put = |name: &str, body: String| {
            zip.start_file(name, options).expect("start zip entry");
            zip.write_all(body.as_bytes()).expect("write zip entry");
        };

        put("mimetype", "application/epub+zip".to_string());
        put(
            "META-INF/container.xml",
            r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#
                .to_string(),
        );

        let mut manifest = String::new();
        let mut spine = String::new();
        let mut nav_items = String::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            let file = format!("text/ch{}.xhtml", i + 1);
            manifest.push_str(&format!(
                r#"<item id="ch{0}" href="{1}" media-type="application/xhtml+xml"/>"#,
                i + 1,
                file
            ));
            spine.push_str(&format!(r#"<itemref idref="ch{}"/>"#, i + 1));
            nav_items.push_str(&format!(r#"<li><a href="{}">{}</a></li>"#, file, chapter.title));

            let body: String = chapter
                .paragraphs
                .iter()
                .map(|p| format!("<p>{}</p>\n", p))
                .collect();
            put(
                &format!("OEBPS/{}", file),
                format!(
                    r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head>
<body>
{}</body></html>"#,
                    chapter.title, body
                ),
            );
        }
        if self.with_nav {
            manifest.push_str(r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#);
            put(
                "OEBPS/nav.xhtml",
                format!(
                    r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body><nav epub:type="toc"><ol>{}</ol></nav></body></html>"#,
                    nav_items
                ),
            );
        }

        put(
            "OEBPS/content.opf",
            format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>{}</manifest>
  <spine>{}</spine>
</package>"#,
                manifest, spine
            ),
        );

        zip.finish().expect("finish zip").into_inner()
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()).expect("write epub fixture");
        path
    }
}

/// Create temporary test database with the bookpair schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = db::init_database_pool(&temp_dir.path().join("bookpair.db"))
        .await
        .expect("Failed to initialize test database");
    (temp_dir, pool)
}

/// Names shared by both editions; one-hot per name, plus an "unknown" axis
pub const MARKERS: [&str; 8] = [
    "alice", "bruno", "carla", "dmitri", "elena", "fabio", "greta", "hugo",
];

/// Embeds texts by counting marker names, so translations of the same
/// paragraph land on the same axis
#[derive(Debug, Default)]
pub struct MarkerEmbedder;

impl MarkerEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; MARKERS.len() + 1];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if let Some(i) = MARKERS.iter().position(|m| *m == word) {
                v[i] += 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[MARKERS.len()] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingOracle for MarkerEmbedder {
    async fn embed(&self, texts: &[String]) -> BatchOutcome<Vec<f32>> {
        BatchOutcome::complete(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// QE oracle returning the same score for every pair
#[derive(Debug)]
pub struct FixedQe(pub f64);

#[async_trait]
impl QualityEstimator for FixedQe {
    async fn score(&self, pairs: &[TranslationPair]) -> BatchOutcome<f64> {
        BatchOutcome::complete(vec![self.0; pairs.len()])
    }
}

/// Orchestrator over fake oracles
pub fn fake_orchestrator(pool: SqlitePool, config: ImportConfig, qe: f64) -> ImportOrchestrator {
    ImportOrchestrator::new(
        pool,
        Arc::new(config),
        Arc::new(MarkerEmbedder),
        Arc::new(FixedQe(qe)),
        None,
    )
}
