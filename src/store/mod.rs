//! Storage abstraction for repo-rag.
//!
//! The [`Store`] trait covers every persistence operation the pipelines
//! need: the per-file retrieval records (the vector store), question/answer
//! history, commit rows, and the project registry. Pipelines receive an
//! `Arc<dyn Store>` so tests can swap in [`InMemoryStore`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

pub use memory::{FailurePlan, InMemoryStore};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::PersistenceError;
use crate::models::{CommitRecord, FileReference, Project, QuestionRecord, SourceRecord, SourceUpsert};

/// Abstract storage backend.
///
/// # Retrieval records
///
/// Rows are written in two phases. [`upsert_source`](Store::upsert_source)
/// creates or replaces the row for `(project_id, file_path)` with the summary
/// and source but no vector, and returns the row id.
/// [`set_embedding`](Store::set_embedding) fills in the vector afterwards.
/// Re-upserting an existing path keeps its id and insertion position but
/// clears the vector until the next `set_embedding`.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_source`](Store::upsert_source) | Phase one: summary + source, no vector |
/// | [`set_embedding`](Store::set_embedding) | Phase two: attach the vector |
/// | [`find_source`](Store::find_source) | Look up one record by path |
/// | [`top_k`](Store::top_k) | Cosine-ranked retrieval within one project |
/// | [`clear_project`](Store::clear_project) | Delete every record of a project |
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_source(&self, source: &SourceUpsert<'_>) -> Result<String, PersistenceError>;

    /// Fails with [`PersistenceError::NotFound`] if `row_id` does not exist.
    async fn set_embedding(&self, row_id: &str, vector: &[f32]) -> Result<(), PersistenceError>;

    async fn find_source(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Option<SourceRecord>, PersistenceError>;

    /// The `k` embedded records of `project_id` most similar to `query`,
    /// by descending cosine similarity. Ties keep insertion order. A project
    /// with no embedded rows yields an empty list.
    async fn top_k(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<FileReference>, PersistenceError>;

    /// Returns the number of records removed.
    async fn clear_project(&self, project_id: &str) -> Result<u64, PersistenceError>;

    /// `(total, embedded)` record counts for a project.
    async fn source_counts(&self, project_id: &str) -> Result<(u64, u64), PersistenceError>;

    // ── questions ──

    async fn save_question(&self, record: &QuestionRecord) -> Result<(), PersistenceError>;

    /// Newest first.
    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>, PersistenceError>;

    /// Returns whether a record was deleted.
    async fn delete_question(&self, id: &str) -> Result<bool, PersistenceError>;

    async fn clear_questions(&self, project_id: &str) -> Result<u64, PersistenceError>;

    // ── commits ──

    async fn commit_hashes(&self, project_id: &str) -> Result<HashSet<String>, PersistenceError>;

    /// Insert or update by `(project_id, commit_hash)`. A `None` summary never
    /// overwrites a stored one. Returns the number of rows written.
    async fn upsert_commits(&self, commits: &[CommitRecord]) -> Result<usize, PersistenceError>;

    /// Newest commit date first.
    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>, PersistenceError>;

    // ── projects ──

    async fn insert_project(&self, project: &Project) -> Result<(), PersistenceError>;

    /// Look up by id, falling back to name.
    async fn get_project(&self, id_or_name: &str) -> Result<Option<Project>, PersistenceError>;

    async fn list_projects(&self) -> Result<Vec<Project>, PersistenceError>;

    /// Delete a project with its records, questions, and commits.
    async fn delete_project(&self, id: &str) -> Result<bool, PersistenceError>;
}

/// Euclidean norm, accumulated in `f64`.
pub fn vector_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Cosine similarity as computed by the SQL backend: the dot product over the
/// overlapping components divided by both full norms. Zero when either
/// vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (na, nb) = (vector_norm(a), vector_norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum();
    dot / (na * nb)
}
