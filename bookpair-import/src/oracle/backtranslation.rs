//! Back-translation check client
//!
//! `POST {base}/btcheck {"pairs": [{"src": .., "tgt": ..}]}` answers either
//! `{"chrf": [...]}` directly, or `{"translations": [...]}` with the target
//! translated back into the source language, in which case chrF is computed
//! here against each source text.

use super::batch::{dispatch_chunks, BatchOutcome, DispatchPlan, RetryPolicy};
use super::{endpoint, http_client, post_json, BackTranslationChecker, OracleError, TranslationPair};
use crate::config::OracleConfig;
use crate::scoring::chrf::chrf;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct BtRequest<'a> {
    pairs: &'a [TranslationPair],
}

#[derive(Deserialize)]
struct BtResponse {
    #[serde(default)]
    chrf: Option<Vec<f64>>,
    #[serde(default)]
    translations: Option<Vec<String>>,
}

pub struct HttpBackTranslationClient {
    client: reqwest::Client,
    url: String,
    plan: DispatchPlan,
}

impl HttpBackTranslationClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        Ok(Self {
            client: http_client(config.backtranslation_timeout_secs)?,
            url: endpoint(config.backtranslation_base(), "btcheck"),
            plan: DispatchPlan {
                oracle: "backtranslation",
                chunk_size: config.backtranslation_batch_size,
                max_in_flight: config.max_in_flight,
                retry: RetryPolicy::new(config.retries, config.backoff_base(), config.backoff_max()),
            },
        })
    }

    async fn check_chunk(&self, pairs: Vec<TranslationPair>) -> Result<Vec<f64>, OracleError> {
        let response: BtResponse = post_json(&self.client, &self.url, &BtRequest { pairs: &pairs }).await?;
        match (response.chrf, response.translations) {
            (Some(scores), _) => Ok(scores.into_iter().map(|s| s.clamp(0.0, 100.0)).collect()),
            (None, Some(back)) => Ok(pairs
                .iter()
                .zip(back.iter())
                .map(|(pair, back)| chrf(&pair.src, back))
                .collect()),
            (None, None) => Err(OracleError::Protocol(
                "btcheck reply has neither chrf nor translations".to_string(),
            )),
        }
    }
}

#[async_trait]
impl BackTranslationChecker for HttpBackTranslationClient {
    async fn check(&self, pairs: &[TranslationPair]) -> BatchOutcome<f64> {
        dispatch_chunks(&self.plan, pairs, 0.0, |chunk| self.check_chunk(chunk)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> OracleConfig {
        OracleConfig {
            base_url: base.to_string(),
            retries: 0,
            ..OracleConfig::default()
        }
    }

    #[tokio::test]
    async fn test_remote_chrf_used_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/btcheck"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chrf": [71.5, 20.0]})))
            .mount(&server)
            .await;

        let client = HttpBackTranslationClient::new(&config(&server.uri())).unwrap();
        let pairs = vec![TranslationPair::new("a", "b"), TranslationPair::new("c", "d")];
        let outcome = client.check(&pairs).await;

        assert_eq!(outcome.values, vec![71.5, 20.0]);
    }

    #[tokio::test]
    async fn test_back_translations_scored_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/btcheck"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"translations": ["The door was open."]})),
            )
            .mount(&server)
            .await;

        let client = HttpBackTranslationClient::new(&config(&server.uri())).unwrap();
        let outcome = client
            .check(&[TranslationPair::new("The door was open.", "A porta estava aberta.")])
            .await;

        assert_eq!(outcome.values, vec![100.0]);
    }

    #[tokio::test]
    async fn test_empty_reply_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/btcheck"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = HttpBackTranslationClient::new(&config(&server.uri())).unwrap();
        let outcome = client.check(&[TranslationPair::new("a", "b")]).await;

        assert_eq!(outcome.values, vec![0.0]);
        assert!(outcome.is_degraded());
    }
}
