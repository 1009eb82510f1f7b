//! Book-pair import: extract → align → gate → enrich → stage → merge
//!
//! [`ImportOrchestrator::import_book_pair`] is the single entry point shared
//! by the CLI and the HTTP API.

pub mod candidate;
pub mod orchestrator;

use crate::align::{AlignError, AlignMode};
use crate::db::StagingError;
use crate::extract::{ExtractError, Granularity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use candidate::PendingCandidate;
pub use orchestrator::ImportOrchestrator;

/// Default rule-quality floor for accepted pairs
pub const DEFAULT_MIN_QUALITY: f64 = 0.55;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read {side} book: {source}")]
    Extract {
        side: &'static str,
        #[source]
        source: ExtractError,
    },

    #[error("Alignment failed: {0}")]
    Align(#[from] AlignError),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Database(#[from] bookpair_common::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// Bulk-load and merge failures keep the run's staging partition
    pub fn keeps_staging(&self) -> bool {
        matches!(self, ImportError::Staging(_) | ImportError::Database(_))
    }
}

fn default_src_lang() -> String {
    "en".to_string()
}

fn default_tgt_lang() -> String {
    "pt".to_string()
}

fn default_min_quality() -> f64 {
    DEFAULT_MIN_QUALITY
}

/// Parameters of one book-pair import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Source-language edition
    pub src_path: PathBuf,
    /// Target-language edition
    pub tgt_path: PathBuf,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub mode: AlignMode,
    #[serde(default = "default_src_lang")]
    pub src_lang: String,
    #[serde(default = "default_tgt_lang")]
    pub tgt_lang: String,
    /// Pairs with a rule quality below this are skipped
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
    #[serde(default)]
    pub series_id: Option<i64>,
    #[serde(default)]
    pub book_id: Option<i64>,
    #[serde(default)]
    pub source_tag: Option<String>,
}

impl ImportRequest {
    pub fn new(src_path: impl Into<PathBuf>, tgt_path: impl Into<PathBuf>) -> Self {
        Self {
            src_path: src_path.into(),
            tgt_path: tgt_path.into(),
            granularity: Granularity::default(),
            mode: AlignMode::default(),
            src_lang: default_src_lang(),
            tgt_lang: default_tgt_lang(),
            min_quality: DEFAULT_MIN_QUALITY,
            series_id: None,
            book_id: None,
            source_tag: None,
        }
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.src_lang.trim().is_empty() || self.tgt_lang.trim().is_empty() {
            return Err(ImportError::InvalidRequest(
                "src_lang and tgt_lang must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_quality) {
            return Err(ImportError::InvalidRequest(format!(
                "min_quality must be within [0, 1] (got {})",
                self.min_quality
            )));
        }
        if self.src_path.as_os_str().is_empty() || self.tgt_path.as_os_str().is_empty() {
            return Err(ImportError::InvalidRequest(
                "src_path and tgt_path are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let request: ImportRequest =
            serde_json::from_str(r#"{"src_path": "a.epub", "tgt_path": "b.epub"}"#).unwrap();
        assert_eq!(request.granularity, Granularity::Paragraph);
        assert_eq!(request.mode, AlignMode::Positional);
        assert_eq!(request.src_lang, "en");
        assert_eq!(request.tgt_lang, "pt");
        assert_eq!(request.min_quality, 0.55);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let mut request = ImportRequest::new("a.epub", "b.epub");
        request.min_quality = 1.5;
        assert!(matches!(request.validate(), Err(ImportError::InvalidRequest(_))));

        let mut request = ImportRequest::new("a.epub", "b.epub");
        request.tgt_lang = " ".into();
        assert!(matches!(request.validate(), Err(ImportError::InvalidRequest(_))));
    }

    #[test]
    fn test_only_persistence_failures_keep_staging() {
        assert!(ImportError::Database(bookpair_common::Error::Internal("locked".into())).keeps_staging());
        assert!(!ImportError::InvalidRequest("bad".into()).keeps_staging());
    }
}
