//! Book-pair import orchestration
//!
//! **Per run:**
//! 1. Ensure schema, purge stale staging partitions, allocate a `run_id`
//! 2. Extract both books (blocking thread)
//! 3. Align with the requested [`AlignMode`]
//! 4. Per pair: dialogue normalization, within-run dedup, ratio/placeholder
//!    gate, rule-quality floor
//! 5. Per group of candidates: QE, final score, optional back-translation,
//!    stage, optional embedding side stream
//! 6. Merge the run's partition, attach embeddings, flag the book
//!
//! Oracle failures degrade individual chunks and never abort the run.
//! Staging and merge failures leave the run's partition in place for
//! inspection (the stale purge removes it later); any other failure
//! discards it.

use super::candidate::PendingCandidate;
use super::{ImportError, ImportRequest};
use crate::align::{build_aligner, AlignMode, AlignedPair};
use crate::config::ImportConfig;
use crate::db::{self, books, embeddings, staging};
use crate::extract::{extract_blocks, Block, Granularity};
use crate::models::{ExamplePair, ImportSummary};
use crate::oracle::{
    BackTranslationChecker, EmbeddingOracle, HttpBackTranslationClient, HttpEmbeddingClient,
    HttpQeClient, OracleError, QualityEstimator,
};
use crate::scoring::normalize::normalize_dialogue;
use crate::scoring::{gate, GateDecision, ScoreComposer};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ImportOrchestrator {
    pool: SqlitePool,
    config: Arc<ImportConfig>,
    composer: ScoreComposer,
    embedder: Arc<dyn EmbeddingOracle>,
    qe: Arc<dyn QualityEstimator>,
    back_translation: Option<Arc<dyn BackTranslationChecker>>,
}

/// Running totals for one import
#[derive(Default)]
struct RunTally {
    inserted: u64,
    skipped: u64,
    quality_sum: f64,
    chapters: HashSet<String>,
    examples: Vec<ExamplePair>,
    degraded_chunks: usize,
    embeddings_staged: u64,
}

impl ImportOrchestrator {
    pub fn new(
        pool: SqlitePool,
        config: Arc<ImportConfig>,
        embedder: Arc<dyn EmbeddingOracle>,
        qe: Arc<dyn QualityEstimator>,
        back_translation: Option<Arc<dyn BackTranslationChecker>>,
    ) -> Self {
        let composer = ScoreComposer::new(config.scoring.clone());
        Self {
            pool,
            config,
            composer,
            embedder,
            qe,
            back_translation,
        }
    }

    /// Wire up HTTP oracle clients from configuration
    pub fn from_config(pool: SqlitePool, config: Arc<ImportConfig>) -> Result<Self, OracleError> {
        let embedder: Arc<dyn EmbeddingOracle> = Arc::new(HttpEmbeddingClient::new(&config.oracles)?);
        let qe: Arc<dyn QualityEstimator> = Arc::new(HttpQeClient::new(&config.oracles)?);
        let back_translation: Option<Arc<dyn BackTranslationChecker>> = if config.pipeline.back_translation {
            Some(Arc::new(HttpBackTranslationClient::new(&config.oracles)?))
        } else {
            None
        };
        Ok(Self::new(pool, config, embedder, qe, back_translation))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import one book pair end to end
    pub async fn import_book_pair(&self, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
        request.validate()?;

        db::ensure_schema(&self.pool).await?;
        staging::purge_stale(&self.pool, self.config.pipeline.stale_staging_minutes).await?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            src = %request.src_path.display(),
            tgt = %request.tgt_path.display(),
            mode = %request.mode,
            granularity = %request.granularity,
            "Starting book-pair import"
        );

        match self.run(&run_id, request).await {
            Ok(summary) => {
                info!(
                    run_id = %run_id,
                    inserted = summary.inserted,
                    skipped = summary.skipped,
                    merged = summary.merged,
                    avg_quality = summary.avg_quality,
                    chapters = summary.chapter_count,
                    degraded_chunks = summary.degraded_chunks,
                    "Book-pair import complete"
                );
                Ok(summary)
            }
            Err(e) if e.keeps_staging() => {
                warn!(run_id = %run_id, error = %e, "Book-pair import failed; staging partition kept for inspection");
                Err(e)
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Book-pair import failed; discarding staging partition");
                if let Err(cleanup) = staging::discard_run(&self.pool, &run_id).await {
                    warn!(run_id = %run_id, error = %cleanup, "Failed to discard staging partition");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, run_id: &str, request: &ImportRequest) -> Result<ImportSummary, ImportError> {
        let src_blocks = extract_side("source", request.src_path.clone(), request.granularity).await?;
        let tgt_blocks = extract_side("target", request.tgt_path.clone(), request.granularity).await?;
        info!(src_blocks = src_blocks.len(), tgt_blocks = tgt_blocks.len(), "Books extracted");

        let aligner = build_aligner(request.mode, Arc::clone(&self.embedder), &self.config.alignment);
        let alignment = aligner.align(&src_blocks, &tgt_blocks).await?;
        drop(src_blocks);
        drop(tgt_blocks);

        let mut tally = RunTally {
            skipped: alignment.dropped as u64,
            degraded_chunks: alignment.degraded_chunks,
            ..RunTally::default()
        };
        let mut candidates = self.gate_pairs(alignment.pairs, request, &mut tally);
        debug!(candidates = candidates.len(), skipped = tally.skipped, "Pairs gated");

        for group in candidates.chunks_mut(self.config.pipeline.group_size.max(1)) {
            self.enrich(group, &mut tally).await;
            self.stage_group(run_id, group, request, &mut tally).await?;
        }

        let merge = db::consolidate(
            &self.pool,
            run_id,
            &self.config.scoring,
            self.config.database.max_lock_wait_ms,
        )
        .await?;

        if tally.embeddings_staged > 0 {
            embeddings::consolidate_embeddings(&self.pool, run_id, self.config.database.max_lock_wait_ms)
                .await?;
        }

        if let Some(book_id) = request.book_id {
            if merge.merged() > 0 {
                books::mark_pairs_imported(&self.pool, book_id).await?;
            }
        }

        let avg_quality = if tally.inserted > 0 {
            tally.quality_sum / tally.inserted as f64
        } else {
            0.0
        };

        Ok(ImportSummary {
            inserted: tally.inserted,
            skipped: tally.skipped,
            avg_quality,
            chapter_count: tally.chapters.len(),
            examples: tally.examples,
            merged: merge.merged(),
            degraded_chunks: tally.degraded_chunks,
        })
    }

    /// Normalize, dedupe and rule-gate aligned pairs
    fn gate_pairs(
        &self,
        pairs: Vec<AlignedPair>,
        request: &ImportRequest,
        tally: &mut RunTally,
    ) -> Vec<PendingCandidate> {
        let filter = &self.config.filter;
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(pairs.len());

        for pair in pairs {
            let src = normalize_dialogue(&pair.src_text);
            let tgt = normalize_dialogue(&pair.tgt_text);
            if src.is_empty() || tgt.is_empty() {
                tally.skipped += 1;
                continue;
            }

            let location = pair.src_block.location();
            let key = format!(
                "{}\u{1}{}\u{1}{}\u{1}{}\u{1}{}",
                src, tgt, request.src_lang, request.tgt_lang, location
            );
            if !seen.insert(key) {
                tally.skipped += 1;
                continue;
            }

            let quality = match gate(&src, &tgt, filter.ratio_min, filter.ratio_max) {
                GateDecision::Accept { quality, .. } => quality,
                GateDecision::RatioOutOfBounds { ratio } => {
                    debug!(location = %location, ratio, "Length ratio out of bounds");
                    tally.skipped += 1;
                    continue;
                }
                GateDecision::PlaceholdersLost => {
                    debug!(location = %location, "Placeholders not preserved");
                    tally.skipped += 1;
                    continue;
                }
            };
            if quality < request.min_quality {
                tally.skipped += 1;
                continue;
            }

            candidates.push(PendingCandidate {
                src,
                tgt,
                chapter_src: pair.src_block.chapter_title.clone(),
                chapter_tgt: pair.tgt_block.chapter_title.clone(),
                location,
                rule_quality: quality,
                align_sim: crate::align::vector::clamp01(pair.similarity),
                qe_score: None,
                bt_score: None,
                final_score: None,
            });
        }

        candidates
    }

    /// QE, final score and optional back-translation for one group
    async fn enrich(&self, group: &mut [PendingCandidate], tally: &mut RunTally) {
        let pairs: Vec<_> = group.iter().map(PendingCandidate::translation_pair).collect();

        let qe = self.qe.score(&pairs).await;
        tally.degraded_chunks += qe.degraded_chunks.len();
        for (candidate, score) in group.iter_mut().zip(qe.values) {
            candidate.qe_score = Some(score);
            candidate.final_score = Some(self.composer.final_score(
                candidate.align_sim,
                candidate.qe_score,
                candidate.rule_quality,
            ));
        }

        if let Some(checker) = &self.back_translation {
            let bt = checker.check(&pairs).await;
            tally.degraded_chunks += bt.degraded_chunks.len();
            for (candidate, chrf) in group.iter_mut().zip(bt.values) {
                candidate.bt_score = Some(chrf);
            }
        }
    }

    async fn stage_group(
        &self,
        run_id: &str,
        group: &[PendingCandidate],
        request: &ImportRequest,
        tally: &mut RunTally,
    ) -> Result<(), ImportError> {
        let records: Vec<_> = group.iter().map(|c| c.to_staging_record(request)).collect();
        let staged = staging::stage_records(&self.pool, run_id, &records).await?;
        tally.inserted += staged;

        for candidate in group {
            tally.quality_sum += candidate.rule_quality;
            if let Some(chapter) = &candidate.chapter_src {
                tally.chapters.insert(chapter.clone());
            }
            if tally.examples.len() < self.config.pipeline.max_examples {
                tally.examples.push(ExamplePair {
                    src: candidate.src.clone(),
                    tgt: candidate.tgt.clone(),
                    quality: candidate.rule_quality,
                });
            }
        }

        if request.mode == AlignMode::Optimal && self.config.pipeline.stream_embeddings {
            self.stream_embeddings(run_id, group, request, tally).await?;
        }
        Ok(())
    }

    /// Embed accepted pairs and stage the vectors alongside the run
    async fn stream_embeddings(
        &self,
        run_id: &str,
        group: &[PendingCandidate],
        request: &ImportRequest,
        tally: &mut RunTally,
    ) -> Result<(), ImportError> {
        let suspect_min = self.config.scoring.suspect_min;
        let selected: Vec<&PendingCandidate> = group
            .iter()
            .filter(|c| !self.config.pipeline.embed_only_approved || c.final_score.unwrap_or(0.0) >= suspect_min)
            .collect();
        if selected.is_empty() {
            return Ok(());
        }

        let src_texts: Vec<String> = selected.iter().map(|c| c.src.clone()).collect();
        let tgt_texts: Vec<String> = selected.iter().map(|c| c.tgt.clone()).collect();
        let src_vectors = self.embedder.embed(&src_texts).await;
        let tgt_vectors = self.embedder.embed(&tgt_texts).await;
        tally.degraded_chunks += src_vectors.degraded_chunks.len() + tgt_vectors.degraded_chunks.len();

        let records: Vec<_> = selected
            .into_iter()
            .zip(src_vectors.values.into_iter().zip(tgt_vectors.values))
            .map(|(c, (es, et))| c.to_embedding_record(request, es, et))
            .collect();
        tally.embeddings_staged += embeddings::stage_embeddings(&self.pool, run_id, &records).await?;
        Ok(())
    }
}

async fn extract_side(
    side: &'static str,
    path: PathBuf,
    granularity: Granularity,
) -> Result<Vec<Block>, ImportError> {
    tokio::task::spawn_blocking(move || extract_blocks(&path, granularity))
        .await?
        .map_err(|source| ImportError::Extract { side, source })
}
