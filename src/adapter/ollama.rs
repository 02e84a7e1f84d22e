use async_trait::async_trait;
use std::time::Duration;

use super::{check_dims, parse_vector, post_json_with_retry, ModelAdapter};
use crate::config::ModelConfig;
use crate::error::AdapterError;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Adapter for a local (or remote) Ollama instance. No API key.
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaAdapter {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let chat_model = config
            .chat_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.chat_model required for Ollama provider"))?;
        let embedding_model = config
            .embedding_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.embedding_model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("model.dims required for Ollama provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            chat_model,
            embedding_model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ModelAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.base_url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        let embedding = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first())
            .ok_or_else(|| {
                AdapterError::Unavailable("Invalid Ollama response: missing embeddings".into())
            })?;

        check_dims(parse_vector(embedding)?, self.dims)
    }

    async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/chat", self.base_url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        let content = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or(AdapterError::EmptyResponse)?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> ModelConfig {
        ModelConfig {
            provider: "ollama".into(),
            chat_model: Some("llama3.1".into()),
            embedding_model: Some("nomic-embed-text".into()),
            dims: Some(2),
            url: Some(url.to_string()),
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_embed_reads_first_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({ "model": "nomic-embed-text" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.25, -0.5]]
            })))
            .mount(&server)
            .await;

        let adapter = OllamaAdapter::new(&config(&server.uri())).unwrap();
        assert_eq!(adapter.embed("x").await.unwrap(), vec![0.25, -0.5]);
    }

    #[tokio::test]
    async fn test_generate_disables_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "A parser." }
            })))
            .mount(&server)
            .await;

        let adapter = OllamaAdapter::new(&config(&server.uri())).unwrap();
        assert_eq!(adapter.generate("q").await.unwrap(), "A parser.");
    }

    #[tokio::test]
    async fn test_blank_answer_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "   " }
            })))
            .mount(&server)
            .await;

        let adapter = OllamaAdapter::new(&config(&server.uri())).unwrap();
        assert!(matches!(
            adapter.generate("q").await,
            Err(AdapterError::EmptyResponse)
        ));
    }
}
