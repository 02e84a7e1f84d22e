use async_trait::async_trait;
use std::time::Duration;

use super::{check_dims, parse_vector, post_json_with_retry, ModelAdapter};
use crate::config::ModelConfig;
use crate::error::AdapterError;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Adapter for the OpenAI API or any server speaking the same protocol.
///
/// Requires the `OPENAI_API_KEY` environment variable unless a key is passed
/// explicitly with [`OpenAiAdapter::with_api_key`]. The configured `dims` is
/// sent as the `dimensions` parameter so `text-embedding-3-*` models return
/// vectors of the stored size.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiAdapter {
    /// Create the adapter from configuration and `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the models or `dims` are not configured, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ModelConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let chat_model = config
            .chat_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.chat_model required for OpenAI provider"))?;
        let embedding_model = config
            .embedding_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.embedding_model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("model.dims required for OpenAI provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            chat_model,
            embedding_model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
            "dimensions": self.dims,
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/v1/embeddings", self.base_url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let embedding = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .ok_or_else(|| {
                AdapterError::Unavailable("Invalid OpenAI response: missing embedding".into())
            })?;

        check_dims(parse_vector(embedding)?, self.dims)
    }

    async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/v1/chat/completions", self.base_url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or(AdapterError::EmptyResponse)?;

        if content.trim().is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            chat_model: Some("gpt-4o-mini".into()),
            embedding_model: Some("text-embedding-3-small".into()),
            dims: Some(3),
            url: Some(url.to_string()),
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_embed_parses_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::with_api_key(&config(&server.uri()), "sk-test").unwrap();
        let v = adapter.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_wrong_dimension_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2] }]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::with_api_key(&config(&server.uri()), "k").unwrap();
        assert!(matches!(
            adapter.embed("hello").await,
            Err(AdapterError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "It adds numbers." } }]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::with_api_key(&config(&server.uri()), "k").unwrap();
        assert_eq!(adapter.generate("q").await.unwrap(), "It adds numbers.");
    }

    #[tokio::test]
    async fn test_client_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::with_api_key(&config(&server.uri()), "k").unwrap();
        let err = adapter.generate("q").await.unwrap_err();
        assert!(err.to_string().contains("bad model"));
    }

    #[test]
    fn test_missing_model_rejected() {
        let mut c = config("http://localhost");
        c.chat_model = None;
        assert!(OpenAiAdapter::with_api_key(&c, "k").is_err());
    }
}
