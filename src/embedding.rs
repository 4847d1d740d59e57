//! Embedding providers behind the core [`Embedder`] trait.
//!
//! - [`DisabledProvider`]: fails every call; used when embeddings are off.
//! - [`OpenAIProvider`]: `POST {url}/v1/embeddings` with a bearer key.
//! - [`OllamaProvider`]: `POST {url}/api/embed` on a local Ollama server.
//! - [`HashEmbedder`]: offline feature hashing, deterministic, for demos and
//!   tests.
//! - `LocalProvider`: fastembed inference, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! Use [`create_embedder`] to build the provider named in `[embedding]`.
//!
//! # Retries
//!
//! Network providers retry only when `embedding.max_retries > 0`, and only
//! for HTTP 5xx and transport failures (timeouts included), with backoff of
//! 1s, 2s, 4s, ... capped at 32s. Authentication (401/403) and quota (429)
//! responses fail immediately. Every failure surfaces as
//! [`Error::EmbeddingProvider`] carrying the provider's message.

use std::time::Duration;

use async_trait::async_trait;
use revdoc_core::embedding::Embedder;
use revdoc_core::error::{Error, Result};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const HASH_DEFAULT_DIMS: usize = 256;
const HASH_SEED: u64 = 1337;

fn provider_error(msg: impl Into<String>) -> Error {
    Error::EmbeddingProvider(msg.into())
}

/// The first vector of a one-element batch.
fn single(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    if vectors.len() != 1 {
        return Err(provider_error(format!(
            "expected 1 embedding, provider returned {}",
            vectors.len()
        )));
    }
    Ok(vectors.remove(0))
}

// ============ Disabled ============

pub struct DisabledProvider;

#[async_trait]
impl Embedder for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(provider_error(
            "embedding provider is disabled; set [embedding] provider in the config",
        ))
    }
}

// ============ Hash ============

/// Bag-of-words feature hashing into `dims` buckets, L2-normalized.
///
/// Texts sharing words score higher under cosine similarity, which is
/// enough to exercise retrieval without a model or network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    seed: u64,
    model: String,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            seed: HASH_SEED,
            model: format!("feature-hash-{}", dims),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket_for(token)] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(token.to_lowercase().as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dims as u64) as usize
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

// ============ HTTP plumbing ============

/// A reqwest client plus the retry budget shared by network providers.
struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    label: &'static str,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpEndpoint {
    fn new(label: &'static str, url: String, config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            label,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    /// POST `body` as JSON and return the decoded response.
    async fn post(&self, bearer: Option<&str>, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(
                    provider = self.label,
                    attempt,
                    max_retries = self.max_retries,
                    delay_secs = delay.as_secs(),
                    error = last_err.as_ref().map(|e: &Error| e.to_string()).unwrap_or_default(),
                    "retrying embedding request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            provider_error(format!("{} returned an unreadable response: {}", self.label, e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = provider_error(format!("{} API error {}: {}", self.label, status, body_text));
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(provider_error(format!(
                        "{} request timed out after {}s",
                        self.label, self.timeout_secs
                    )));
                }
                Err(e) => {
                    last_err = Some(provider_error(format!(
                        "{} connection error ({}): {}",
                        self.label, self.url, e
                    )));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| provider_error(format!("{} embedding failed", self.label))))
    }
}

/// Only server-side failures are worth repeating; 4xx (429 included) are not.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
}

fn float_array(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| provider_error(format!("invalid response: {} is not an array", what)))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| provider_error(format!("invalid response: non-numeric value in {}", what)))
        })
        .collect()
}

// ============ OpenAI ============

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    endpoint: HttpEndpoint,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL).trim_end_matches('/');
        let endpoint = HttpEndpoint::new("OpenAI", format!("{}/v1/embeddings", base), config)?;

        Ok(Self {
            model,
            dims,
            api_key,
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.endpoint.post(Some(&self.api_key), &body).await?;
        parse_openai_response(&json)
    }
}

/// `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| provider_error("invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map_or(pos, |i| i as usize);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| provider_error("invalid OpenAI response: missing embedding"))?;
        indexed.push((index, float_array(embedding, "embedding")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaProvider {
    model: String,
    dims: usize,
    endpoint: HttpEndpoint,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL).trim_end_matches('/');
        let endpoint = HttpEndpoint::new("Ollama", format!("{}/api/embed", base), config)?;

        Ok(Self { model, dims, endpoint })
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self.endpoint.post(None, &body).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| provider_error("invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| float_array(e, "embedding"))
        .collect()
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    /// Loads the model, downloading it on first use.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model_id, default_dims) = fastembed_model(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model_id).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims: default_dims,
            batch_size: config.batch_size,
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> anyhow::Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    Ok(match name {
        "all-minilm-l6-v2" => (M::AllMiniLML6V2, 384),
        "bge-small-en-v1.5" => (M::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (M::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (M::BGELargeENV15, 1024),
        "nomic-embed-text-v1.5" => (M::NomicEmbedTextV15, 768),
        "multilingual-e5-small" => (M::MultilingualE5Small, 384),
        "multilingual-e5-base" => (M::MultilingualE5Base, 768),
        other => anyhow::bail!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ),
    })
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        single(self.embed_batch(&[text.to_string()]).await?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = std::sync::Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| provider_error("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| provider_error(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| provider_error(format!("local embedding task failed: {}", e)))?
    }
}

/// Build the provider named by `config.provider`.
///
/// `api_key` is only consulted by the `openai` provider, where it is
/// required.
pub fn create_embedder(config: &EmbeddingConfig, api_key: Option<String>) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "hash" => Ok(Box::new(HashEmbedder::new(config.dims.unwrap_or(HASH_DEFAULT_DIMS)))),
        "openai" => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("OpenAI provider needs an API key (--api-key or OPENAI_API_KEY)"))?;
            Ok(Box::new(OpenAIProvider::new(config, key)?))
        }
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => anyhow::bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config_for(provider: &str, url: Option<String>, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            url,
            max_retries,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    /// Serves `status` with `body` to every request; returns base URL and hit counter.
    async fn canned_server(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                // read headers, then the declared body
                loop {
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    if let Some(split) = text.find("\r\n\r\n") {
                        let length = text[..split]
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if request.len() >= split + 4 + length {
                            break;
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let (url, hits) = canned_server("401 Unauthorized", r#"{"error":"invalid api key"}"#).await;
        let provider = OpenAIProvider::new(&config_for("openai", Some(url), 3), "sk-bad".to_string()).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        match err {
            Error::EmbeddingProvider(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("invalid api key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let (url, hits) = canned_server("429 Too Many Requests", r#"{"error":"quota"}"#).await;
        let provider = OllamaProvider::new(&config_for("ollama", Some(url), 2)).unwrap();
        assert!(provider.embed("hello").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_when_enabled() {
        let (url, hits) = canned_server("503 Service Unavailable", "busy").await;
        let provider = OllamaProvider::new(&config_for("ollama", Some(url), 1)).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_error_not_retried_by_default() {
        let (url, hits) = canned_server("500 Internal Server Error", "boom").await;
        let provider = OllamaProvider::new(&config_for("ollama", Some(url), 0)).unwrap();
        assert!(provider.embed("hello").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_provider_error() {
        let url = silent_server().await;
        let config = EmbeddingConfig {
            timeout_secs: 1,
            ..config_for("ollama", Some(url), 0)
        };
        let provider = OllamaProvider::new(&config).unwrap();
        match provider.embed("hello").await.unwrap_err() {
            Error::EmbeddingProvider(msg) => assert!(msg.contains("timed out"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ollama_success() {
        let (url, _) = canned_server("200 OK", r#"{"embeddings":[[0.5,0.25]]}"#).await;
        let provider = OllamaProvider::new(&config_for("ollama", Some(url), 0)).unwrap();
        assert_eq!(provider.embed("hello").await.unwrap(), vec![0.5, 0.25]);
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_rejects_garbage() {
        assert!(parse_openai_response(&serde_json::json!({"error": "nope"})).is_err());
        let bad = serde_json::json!({"data": [{"embedding": ["x"]}]});
        assert!(parse_openai_response(&bad).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]});
        assert_eq!(parse_ollama_response(&json).unwrap().len(), 2);
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_text("Budget deadline moved");
        let b = embedder.embed_text("budget, deadline; moved!");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed_text("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_hash_embedder_prefers_shared_words() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_text("quarterly revenue");
        let close = embedder.embed_text("revenue grew this quarterly period");
        let far = embedder.embed_text("holiday policy for remote staff");
        let sim = revdoc_core::embedding::cosine_similarity;
        assert!(sim(&query, &close) > sim(&query, &far));
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let err = DisabledProvider.embed("x").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingProvider(_)));
    }

    #[test]
    fn test_create_embedder() {
        assert_eq!(
            create_embedder(&config_for("hash", None, 0), None).unwrap().model_name(),
            "feature-hash-1536"
        );
        let err = create_embedder(&config_for("openai", None, 0), None).err().unwrap();
        assert!(err.to_string().contains("API key"));
        assert!(create_embedder(&config_for("openai", None, 0), Some("sk-test".to_string())).is_ok());
        assert!(create_embedder(&config_for("bogus", None, 0), None).is_err());
    }
}
