//! Core data models used throughout repo-rag.
//!
//! These types represent the loaded documents, persisted retrieval records,
//! question/answer history, and commit rows that flow through the indexing
//! and query pipelines.

use serde::{Deserialize, Serialize};

/// A file loaded from a repository snapshot. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Repository-relative path, unique within one snapshot.
    pub path: String,
    pub content: String,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// Last path segment (`src/lib.rs` → `lib.rs`).
    pub fn file_name(&self) -> &str {
        file_name_of(&self.path)
    }
}

pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether a retrieval record has its vector yet.
///
/// Rows are written in two steps: the summary first, the embedding second.
/// A row stuck in `PendingEmbedding` is readable but never returned by top-K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingState {
    PendingEmbedding,
    Embedded,
}

/// Persisted retrieval unit: one per (project, file path).
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub file_path: String,
    pub summary: String,
    pub source_code: String,
    /// SHA-256 of `source_code`, used to detect unchanged files.
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SourceRecord {
    pub fn state(&self) -> EmbeddingState {
        if self.embedding.is_some() {
            EmbeddingState::Embedded
        } else {
            EmbeddingState::PendingEmbedding
        }
    }
}

/// First write of the two-phase insert: everything except the vector.
#[derive(Debug, Clone)]
pub struct SourceUpsert<'a> {
    pub project_id: &'a str,
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub summary: &'a str,
    pub source_code: &'a str,
    pub content_hash: &'a str,
}

/// A retrieval hit frozen into an answer.
///
/// Question records store a copy of these, not a link to the source row, so
/// re-indexing never rewrites historical answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub file_name: String,
    pub summary: String,
    pub source_code: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    pub project_id: String,
    pub question: String,
    pub answer: String,
    pub file_references: Vec<FileReference>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub project_id: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub commit_author_name: String,
    pub commit_author_avatar: Option<String>,
    /// RFC 3339 timestamp as reported by the host.
    pub commit_date: String,
    /// Absent until a summary (AI or fallback) has been produced.
    pub summary: Option<String>,
}

/// A registered repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub repo_url: String,
    pub branch: Option<String>,
    pub created_at: i64,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// False only when documents were attempted and every one failed.
    pub success: bool,
    pub processed_count: usize,
    pub skipped_count: usize,
    /// `"<path>: <reason>"`, in input order.
    pub errors: Vec<String>,
    /// Documents that used the pattern summary because the model failed.
    pub fallback_summaries: usize,
    pub duration_ms: u64,
}

/// Result handed back to the asker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<FileReference>,
    /// Set when the Q&A record was persisted.
    pub question_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitPollReport {
    pub fetched: usize,
    pub new_commits: usize,
    pub ai_summaries: usize,
    pub fallback_summaries: usize,
}
