//! Clients for the external scoring services
//!
//! Three oracles, each behind a trait so the pipeline can run against fakes:
//! - [`EmbeddingOracle`] - text → vector (`POST /embed`)
//! - [`QualityEstimator`] - (src, mt) → QE score (`POST /qe`)
//! - [`BackTranslationChecker`] - (src, tgt) → chrF 0..100 (`POST /btcheck`)
//!
//! None of them fails a whole call: chunks that cannot be scored are filled
//! with neutral values and reported in [`BatchOutcome::degraded_chunks`].

pub mod backtranslation;
pub mod batch;
pub mod embedding;
pub mod qe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backtranslation::HttpBackTranslationClient;
pub use batch::{BatchOutcome, DispatchPlan, RetryPolicy};
pub use embedding::HttpEmbeddingClient;
pub use qe::HttpQeClient;

/// Errors from a single oracle request
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected oracle response: {0}")]
    Protocol(String),
}

impl OracleError {
    /// Client errors (other than 408/429) will not succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }
}

/// Source text and its translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationPair {
    pub src: String,
    pub tgt: String,
}

impl TranslationPair {
    pub fn new(src: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            tgt: tgt.into(),
        }
    }
}

#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// One vector per input text, in input order. Degraded items are empty vectors.
    async fn embed(&self, texts: &[String]) -> BatchOutcome<Vec<f32>>;
}

#[async_trait]
pub trait QualityEstimator: Send + Sync {
    /// One raw QE score per pair, in input order. Degraded items score 0.0.
    async fn score(&self, pairs: &[TranslationPair]) -> BatchOutcome<f64>;
}

#[async_trait]
pub trait BackTranslationChecker: Send + Sync {
    /// One chrF (0..100) per pair, in input order. Degraded items score 0.0.
    async fn check(&self, pairs: &[TranslationPair]) -> BatchOutcome<f64>;
}

/// Build the shared HTTP client for one oracle
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, OracleError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("bookpair-import/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` as JSON and decode the JSON reply
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<R, OracleError>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OracleError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<R>()
        .await
        .map_err(|e| OracleError::Protocol(e.to_string()))
}

pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
