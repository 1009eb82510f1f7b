//! Embedding oracle client
//!
//! `POST {base}/embed {"texts": [...], "normalize": true}` → `{"vectors": [[...], ...]}`

use super::batch::{dispatch_chunks, BatchOutcome, DispatchPlan, RetryPolicy};
use super::{endpoint, http_client, post_json, EmbeddingOracle, OracleError};
use crate::config::OracleConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    url: String,
    plan: DispatchPlan,
}

impl HttpEmbeddingClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        Ok(Self {
            client: http_client(config.embedding_timeout_secs)?,
            url: endpoint(config.embedding_base(), "embed"),
            plan: DispatchPlan {
                oracle: "embedding",
                chunk_size: config.embedding_batch_size,
                max_in_flight: config.max_in_flight,
                retry: RetryPolicy::new(config.retries, config.backoff_base(), config.backoff_max()),
            },
        })
    }

    async fn embed_chunk(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, OracleError> {
        let request = EmbedRequest {
            texts: &texts,
            normalize: true,
        };
        let response: EmbedResponse = post_json(&self.client, &self.url, &request).await?;
        debug!(texts = texts.len(), vectors = response.vectors.len(), "Embedding chunk scored");
        Ok(response.vectors)
    }
}

#[async_trait]
impl EmbeddingOracle for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> BatchOutcome<Vec<f32>> {
        dispatch_chunks(&self.plan, texts, Vec::new(), |chunk| self.embed_chunk(chunk)).await
    }
}
