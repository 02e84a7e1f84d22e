#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use repo_rag::adapter::{ModelAdapter, SummaryTarget};
use repo_rag::config::Config;
use repo_rag::error::AdapterError;
use repo_rag::store::SqliteStore;

/// Deterministic model: summaries and vectors come from lookup tables.
pub struct StubAdapter {
    /// File name -> summary. Unlisted files get `"summary of <name>"`.
    pub summaries: HashMap<String, String>,
    /// Exact text -> vector. Unlisted text embeds to `[0, 0, 1]`.
    pub vectors: HashMap<String, Vec<f32>>,
    /// `embed` fails for any text containing one of these.
    pub fail_embed_for: Vec<String>,
    /// `embed` hangs for a minute on any text containing one of these.
    pub stall_embed_for: Vec<String>,
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self {
            summaries: HashMap::new(),
            vectors: HashMap::new(),
            fail_embed_for: Vec::new(),
            stall_embed_for: Vec::new(),
            answer: "stub answer".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn summary(mut self, file_name: &str, summary: &str, vector: Vec<f32>) -> Self {
        self.summaries.insert(file_name.to_string(), summary.to_string());
        self.vectors.insert(summary.to_string(), vector);
        self
    }

    pub fn vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn fail_embed(mut self, marker: &str) -> Self {
        self.fail_embed_for.push(marker.to_string());
        self
    }

    pub fn stall_embed(mut self, marker: &str) -> Self {
        self.stall_embed_for.push(marker.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAdapter for StubAdapter {
    fn name(&self) -> &str {
        "stub"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn summarize(&self, _text: &str, target: SummaryTarget<'_>) -> Result<String, AdapterError> {
        Ok(match target {
            SummaryTarget::File { name } => self
                .summaries
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("summary of {name}")),
            SummaryTarget::CommitDiff => "diff summary".to_string(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        if self.fail_embed_for.iter().any(|m| text.contains(m.as_str())) {
            return Err(AdapterError::Unavailable("stub embed failure".into()));
        }
        if self.stall_embed_for.iter().any(|m| text.contains(m.as_str())) {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
    }

    async fn generate(&self, prompt: &str) -> Result<String, AdapterError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// A migrated SQLite store in `dir`.
pub async fn sqlite_store(dir: &Path) -> Arc<SqliteStore> {
    let pool = repo_rag::db::connect_path(&dir.join("repo-rag.sqlite"))
        .await
        .unwrap();
    repo_rag::migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::minimal();
    config.db.path = dir.join("repo-rag.sqlite");
    config.indexing.delay_ms = 0;
    config
}
