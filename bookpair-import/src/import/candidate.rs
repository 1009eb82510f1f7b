//! Accepted pairs on their way to staging

use super::ImportRequest;
use crate::db::embeddings::EmbeddingRecord;
use crate::db::StagingRecord;
use crate::oracle::TranslationPair;

/// A gated pair, enriched in place by the oracle stages
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCandidate {
    pub src: String,
    pub tgt: String,
    pub chapter_src: Option<String>,
    pub chapter_tgt: Option<String>,
    /// `spine=X;block=Y;sent=Z` of the source block
    pub location: String,
    pub rule_quality: f64,
    /// Aligner similarity clamped to [0, 1]
    pub align_sim: f64,
    pub qe_score: Option<f64>,
    pub bt_score: Option<f64>,
    pub final_score: Option<f64>,
}

impl PendingCandidate {
    pub fn translation_pair(&self) -> TranslationPair {
        TranslationPair::new(self.src.clone(), self.tgt.clone())
    }

    pub fn to_staging_record(&self, request: &ImportRequest) -> StagingRecord {
        StagingRecord {
            src: self.src.clone(),
            tgt: self.tgt.clone(),
            lang_src: request.src_lang.clone(),
            lang_tgt: request.tgt_lang.clone(),
            quality: self.rule_quality,
            series_id: request.series_id,
            book_id: request.book_id,
            chapter_src: self.chapter_src.clone(),
            chapter_tgt: self.chapter_tgt.clone(),
            location: Some(self.location.clone()),
            source_tag: request.source_tag.clone(),
            qe_score: self.qe_score,
            bt_score: self.bt_score,
            final_score: self.final_score,
        }
    }

    pub fn to_embedding_record(
        &self,
        request: &ImportRequest,
        emb_src: Vec<f32>,
        emb_tgt: Vec<f32>,
    ) -> EmbeddingRecord {
        EmbeddingRecord {
            src: self.src.clone(),
            tgt: self.tgt.clone(),
            lang_src: request.src_lang.clone(),
            lang_tgt: request.tgt_lang.clone(),
            series_id: request.series_id,
            book_id: request.book_id,
            source_tag: request.source_tag.clone(),
            quality: self.rule_quality,
            emb_src,
            emb_tgt,
        }
    }
}
