use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::services::memory::providers::{EmbeddingProvider, HealthFlag, Outcome};
use crate::utils::retry::{retry_with_backoff, AttemptError, RetryPolicy};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI-compatible embedding client (`POST {base_url}/embeddings`).
/// Failures never surface as errors: they degrade to zero vectors.
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
    health: HealthFlag,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::with_timeout(timeout),
            health: HealthFlag::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn zeros(&self, n: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; self.dimension]; n]
    }

    /// One provider request with retries; output in input order.
    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let result = retry_with_backoff(&self.retry, "embedding request", || {
            self.attempt(texts)
        })
        .await;
        self.health.set(result.is_ok());
        result
    }

    async fn attempt(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttemptError> {
        debug!("Requesting {} embeddings", texts.len());

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Permanent(e.into()))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(AttemptError::Permanent(anyhow::anyhow!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                data.len()
            )));
        }
        if let Some(bad) = data.iter().find(|d| d.embedding.len() != self.dimension) {
            return Err(AttemptError::Permanent(anyhow::anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.embedding.len()
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Outcome<Vec<f32>> {
        match self.request_batch(&[text.to_string()]).await {
            Ok(mut embeddings) if !embeddings.is_empty() => Outcome::Fresh(embeddings.swap_remove(0)),
            Ok(_) => Outcome::degraded(vec![0.0; self.dimension], "empty embedding response"),
            Err(e) => {
                warn!("Embedding failed, using zero vector: {:#}", e);
                Outcome::degraded(vec![0.0; self.dimension], format!("embedding failed: {:#}", e))
            }
        }
    }

    /// Provider batches of at most `batch_size` texts. A failed batch is
    /// replaced by zero vectors for every one of its texts.
    async fn embed_batch(&self, texts: &[String]) -> Outcome<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let mut failures = Vec::new();

        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            match self.request_batch(batch).await {
                Ok(batch_embeddings) => embeddings.extend(batch_embeddings),
                Err(e) => {
                    warn!(
                        "Embedding batch {} ({} texts) failed, using zero vectors: {:#}",
                        n,
                        batch.len(),
                        e
                    );
                    failures.push(format!("batch {}: {:#}", n, e));
                    embeddings.extend(self.zeros(batch.len()));
                }
            }
        }

        if failures.is_empty() {
            Outcome::Fresh(embeddings)
        } else {
            Outcome::degraded(embeddings, failures.join("; "))
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_healthy(&self) -> bool {
        !self.embed("Health check").await.is_degraded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn config(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: server.uri(),
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 2,
            batch_size: 100,
            timeout_seconds: 5,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn service(server: &MockServer) -> EmbeddingService {
        EmbeddingService::new(&config(server))
            .unwrap()
            .with_retry(fast_retry())
    }

    /// Answers every request in reverse index order with `[position, 1]`,
    /// where position is parsed from texts named `t{n}`. Batches smaller
    /// than `fail_below` get a 500.
    struct ReversedEmbeddings {
        fail_below: usize,
    }

    impl Respond for ReversedEmbeddings {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let input = body["input"].as_array().unwrap();
            if input.len() < self.fail_below {
                return ResponseTemplate::new(500);
            }

            let data: Vec<Value> = input
                .iter()
                .enumerate()
                .rev()
                .map(|(index, text)| {
                    let n: f32 = text.as_str().unwrap()[1..].parse().unwrap();
                    json!({"embedding": [n, 1.0], "index": index})
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[tokio::test]
    async fn test_batches_split_and_preserve_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ReversedEmbeddings { fail_below: 0 })
            .expect(2)
            .mount(&server)
            .await;

        let outcome = service(&server).embed_batch(&texts(150)).await;
        assert!(!outcome.is_degraded());

        let embeddings = outcome.into_inner();
        assert_eq!(embeddings.len(), 150);
        for (i, embedding) in embeddings.iter().enumerate() {
            assert_eq!(embedding, &vec![i as f32, 1.0]);
        }
    }

    #[tokio::test]
    async fn test_failed_batch_zero_filled_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ReversedEmbeddings { fail_below: 100 })
            .mount(&server)
            .await;

        let outcome = service(&server).embed_batch(&texts(150)).await;
        assert!(outcome.is_degraded());

        let embeddings = outcome.into_inner();
        assert_eq!(embeddings.len(), 150);
        assert_eq!(embeddings[99], vec![99.0, 1.0]);
        assert!(embeddings[100..].iter().all(|e| e == &vec![0.0, 0.0]));
    }

    #[tokio::test]
    async fn test_single_text_failure_degrades_to_zero_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .expect(1)
            .mount(&server)
            .await;

        let service = service(&server);
        let outcome = service.embed("hello").await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_inner(), vec![0.0, 0.0]);
        assert!(!service.health.get());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ReversedEmbeddings { fail_below: 0 })
            .expect(1)
            .mount(&server)
            .await;

        let outcome = service(&server).embed("t7").await;
        assert_eq!(outcome, Outcome::Fresh(vec![7.0, 1.0]));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_degraded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .mount(&server)
            .await;

        let outcome = service(&server).embed("hello").await;
        assert!(outcome.is_degraded());
    }
}
