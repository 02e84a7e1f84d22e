//! Model adapter abstraction and implementations.
//!
//! Defines the [`ModelAdapter`] trait that wraps a remote text-generation and
//! embedding model, plus the concrete backends:
//! - **[`DisabledAdapter`]**: fails every call; used when no model is configured.
//! - **[`OpenAiAdapter`]**: OpenAI-compatible `/v1/chat/completions` and `/v1/embeddings`.
//! - **[`OllamaAdapter`]**: a local Ollama instance's `/api/chat` and `/api/embed`.
//!
//! On top of the raw adapter sits the summarizer strategy: [`summarize_document`]
//! and [`summarize_commit`] try the model first and fall back to the
//! deterministic keyword summaries in [`fallback`] when the call fails. There is
//! no fallback for [`ModelAdapter::embed`]: a failed embedding is an error, never
//! a zero vector.
//!
//! # Retry Strategy
//!
//! Both HTTP backends retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

pub mod fallback;
mod ollama;
mod openai;

pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::error::AdapterError;
use crate::prompt;
use crate::settle::bounded;

/// What a piece of text passed to [`ModelAdapter::summarize`] is.
#[derive(Debug, Clone, Copy)]
pub enum SummaryTarget<'a> {
    /// Source file content; `name` is the file name shown to the model.
    File { name: &'a str },
    /// Unified diff of one commit.
    CommitDiff,
}

/// A remote model behind three calls.
///
/// `summarize` has a default implementation that builds the matching prompt
/// and delegates to `generate`, so backends only implement the two raw calls.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Short backend identifier for logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Dimension every vector from [`embed`](ModelAdapter::embed) must have.
    fn dims(&self) -> usize;

    async fn summarize(&self, text: &str, target: SummaryTarget<'_>) -> Result<String, AdapterError> {
        let prompt = match target {
            SummaryTarget::File { name } => prompt::file_summary_prompt(name, text),
            SummaryTarget::CommitDiff => prompt::commit_summary_prompt(text),
        };
        let summary = self.generate(&prompt).await?;
        if summary.trim().is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        Ok(summary.trim().to_string())
    }

    /// Embed `text`. Must return an error rather than a placeholder vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;

    async fn generate(&self, prompt: &str) -> Result<String, AdapterError>;
}

// ============ Disabled Adapter ============

/// An adapter that refuses every call.
///
/// Used when `model.provider = "disabled"`. Summaries still work through the
/// pattern fallback; embedding and generation fail with [`AdapterError::Disabled`].
pub struct DisabledAdapter;

#[async_trait]
impl ModelAdapter for DisabledAdapter {
    fn name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AdapterError> {
        Err(AdapterError::Disabled)
    }

    async fn generate(&self, _prompt: &str) -> Result<String, AdapterError> {
        Err(AdapterError::Disabled)
    }
}

/// Create the adapter selected by `config.provider`.
///
/// | Config Value | Adapter |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledAdapter`] |
/// | `"openai"` | [`OpenAiAdapter`] |
/// | `"ollama"` | [`OllamaAdapter`] |
pub fn create_adapter(config: &ModelConfig) -> anyhow::Result<Arc<dyn ModelAdapter>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAdapter)),
        "openai" => Ok(Arc::new(OpenAiAdapter::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaAdapter::new(config)?)),
        other => anyhow::bail!("Unknown model provider: {}", other),
    }
}

// ============ Summarizer strategy ============

/// Which strategy produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Summarizer {
    Ai,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub strategy: Summarizer,
}

/// Summarize a source file, falling back to a keyword summary on failure.
pub async fn summarize_document(
    adapter: &dyn ModelAdapter,
    content: &str,
    path: &str,
    limit: Duration,
) -> Summary {
    let name = crate::models::file_name_of(path);
    let call = adapter.summarize(content, SummaryTarget::File { name });
    match bounded(limit, call, AdapterError::Timeout).await {
        Ok(text) => Summary {
            text,
            strategy: Summarizer::Ai,
        },
        Err(e) => {
            tracing::warn!(path, error = %e, "file summary failed, using pattern summary");
            Summary {
                text: fallback::document_summary(path, content),
                strategy: Summarizer::Pattern,
            }
        }
    }
}

/// Summarize a commit diff, falling back to a message-keyword summary.
pub async fn summarize_commit(
    adapter: &dyn ModelAdapter,
    diff: Option<&str>,
    message: &str,
    limit: Duration,
) -> Summary {
    let diff = match diff {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            return Summary {
                text: fallback::commit_summary(message),
                strategy: Summarizer::Pattern,
            }
        }
    };

    let call = adapter.summarize(diff, SummaryTarget::CommitDiff);
    match bounded(limit, call, AdapterError::Timeout).await {
        Ok(text) => Summary {
            text,
            strategy: Summarizer::Ai,
        },
        Err(e) => {
            tracing::warn!(error = %e, "commit summary failed, using pattern summary");
            Summary {
                text: fallback::commit_summary(message),
                strategy: Summarizer::Pattern,
            }
        }
    }
}

/// Reject vectors that are empty or of the wrong dimension.
pub(crate) fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, AdapterError> {
    if vector.is_empty() {
        return Err(AdapterError::EmptyResponse);
    }
    if expected > 0 && vector.len() != expected {
        return Err(AdapterError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(vector)
}

/// POST `body` to `url`, retrying 429/5xx and network errors.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    provider: &str,
) -> Result<serde_json::Value, AdapterError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        if let Some(key) = bearer {
            req = req.bearer_auth(key);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return Ok(json);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = AdapterError::Unavailable(format!(
                    "{} API error {}: {}",
                    provider, status, body_text
                ));

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(AdapterError::Unavailable(format!(
                    "{} connection error: {}",
                    provider, e
                )));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| AdapterError::Unavailable(format!("{provider} failed after retries"))))
}

/// Parse a JSON number array into `f32`s, rejecting non-numbers.
pub(crate) fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, AdapterError> {
    value
        .as_array()
        .ok_or_else(|| AdapterError::Unavailable("embedding is not an array".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| AdapterError::Unavailable("embedding contains a non-number".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AdapterError> {
            Ok(vec![1.0, 0.0, 0.0])
        }
        async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AdapterError::Unavailable("down".into()))
            } else if prompt.contains("git diff") {
                Ok("  - changed things  ".into())
            } else {
                Ok("explains the file".into())
            }
        }
    }

    fn adapter(fail: bool) -> CountingAdapter {
        CountingAdapter {
            fail,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_document_summary_uses_model() {
        let a = adapter(false);
        let s = summarize_document(&a, "fn main() {}", "src/main.rs", Duration::from_secs(5)).await;
        assert_eq!(s.strategy, Summarizer::Ai);
        assert_eq!(s.text, "explains the file");
    }

    #[tokio::test]
    async fn test_document_summary_falls_back() {
        let a = adapter(true);
        let s = summarize_document(&a, "pub fn run() {}", "src/app.rs", Duration::from_secs(5)).await;
        assert_eq!(s.strategy, Summarizer::Pattern);
        assert!(s.text.contains("app.rs"));
        assert!(s.text.contains("run"));
    }

    #[tokio::test]
    async fn test_commit_summary_trims_model_output() {
        let a = adapter(false);
        let s = summarize_commit(&a, Some("+ a\n- b"), "fix: thing", Duration::from_secs(5)).await;
        assert_eq!(s.strategy, Summarizer::Ai);
        assert_eq!(s.text, "- changed things");
    }

    #[tokio::test]
    async fn test_commit_without_diff_skips_model() {
        let a = adapter(false);
        let s = summarize_commit(&a, None, "fix: crash on start", Duration::from_secs(5)).await;
        assert_eq!(s.strategy, Summarizer::Pattern);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_adapter_refuses() {
        assert!(matches!(
            DisabledAdapter.embed("x").await,
            Err(AdapterError::Disabled)
        ));
        assert!(matches!(
            DisabledAdapter.generate("x").await,
            Err(AdapterError::Disabled)
        ));
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(vec![1.0, 2.0], 2).is_ok());
        assert!(matches!(
            check_dims(vec![], 2),
            Err(AdapterError::EmptyResponse)
        ));
        assert!(matches!(
            check_dims(vec![1.0], 2),
            Err(AdapterError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_parse_vector_rejects_strings() {
        let ok = parse_vector(&serde_json::json!([0.5, 1, -2.0])).unwrap();
        assert_eq!(ok, vec![0.5, 1.0, -2.0]);
        assert!(parse_vector(&serde_json::json!([0.5, "x"])).is_err());
    }

    #[test]
    fn test_create_adapter_disabled() {
        let a = create_adapter(&ModelConfig::default()).unwrap();
        assert_eq!(a.name(), "disabled");
    }
}
