//! Quality-estimation oracle client
//!
//! `POST {base}/qe {"items": [{"src": .., "mt": ..}]}` → `{"scores": [...], "mean": ..}`
//!
//! Scores are passed through raw; scale mapping happens in
//! [`crate::scoring::normalize_qe`].

use super::batch::{dispatch_chunks, BatchOutcome, DispatchPlan, RetryPolicy};
use super::{endpoint, http_client, post_json, OracleError, QualityEstimator, TranslationPair};
use crate::config::OracleConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct QeItem<'a> {
    src: &'a str,
    mt: &'a str,
}

#[derive(Serialize)]
struct QeRequest<'a> {
    items: Vec<QeItem<'a>>,
}

#[derive(Deserialize)]
struct QeResponse {
    scores: Vec<Option<f64>>,
    #[serde(default)]
    mean: Option<f64>,
}

pub struct HttpQeClient {
    client: reqwest::Client,
    url: String,
    plan: DispatchPlan,
}

impl HttpQeClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        Ok(Self {
            client: http_client(config.qe_timeout_secs)?,
            url: endpoint(config.qe_base(), "qe"),
            plan: DispatchPlan {
                oracle: "qe",
                chunk_size: config.qe_batch_size,
                max_in_flight: config.max_in_flight,
                retry: RetryPolicy::new(config.retries, config.backoff_base(), config.backoff_max()),
            },
        })
    }

    async fn score_chunk(&self, pairs: Vec<TranslationPair>) -> Result<Vec<f64>, OracleError> {
        let request = QeRequest {
            items: pairs
                .iter()
                .map(|p| QeItem {
                    src: &p.src,
                    mt: &p.tgt,
                })
                .collect(),
        };
        let response: QeResponse = post_json(&self.client, &self.url, &request).await?;
        debug!(items = pairs.len(), mean = ?response.mean, "QE chunk scored");
        Ok(response
            .scores
            .into_iter()
            .map(|s| s.filter(|x| x.is_finite()).unwrap_or(0.0))
            .collect())
    }
}

#[async_trait]
impl QualityEstimator for HttpQeClient {
    async fn score(&self, pairs: &[TranslationPair]) -> BatchOutcome<f64> {
        dispatch_chunks(&self.plan, pairs, 0.0, |chunk| self.score_chunk(chunk)).await
    }
}
