//! In-memory [`Store`] implementation for tests and ephemeral runs.
//!
//! Uses `Vec`s behind `std::sync::Mutex`; insertion order doubles as the
//! similarity tie-break. Vector search is brute-force cosine similarity with
//! the same arithmetic as the SQLite backend. A [`FailurePlan`] makes chosen
//! writes fail so pipelines can be tested under partial failure.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{cosine_similarity, Store};
use crate::error::PersistenceError;
use crate::models::{
    CommitRecord, FileReference, Project, QuestionRecord, SourceRecord, SourceUpsert,
};

/// Writes that an [`InMemoryStore`] should reject.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// File paths whose `upsert_source` fails.
    pub upsert_paths: HashSet<String>,
    /// File paths whose `set_embedding` fails.
    pub embedding_paths: HashSet<String>,
    /// Every `save_question` fails.
    pub question_writes: bool,
    /// Every `top_k` fails.
    pub retrievals: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    sources: Mutex<Vec<SourceRecord>>,
    questions: Mutex<Vec<QuestionRecord>>,
    commits: Mutex<Vec<CommitRecord>>,
    projects: Mutex<Vec<Project>>,
    failures: Mutex<FailurePlan>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(plan: FailurePlan) -> Self {
        let store = Self::default();
        *lock(&store.failures) = plan;
        store
    }

    /// Every record of a project, in insertion order.
    pub fn sources(&self, project_id: &str) -> Vec<SourceRecord> {
        lock(&self.sources)
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn injected(what: &str) -> PersistenceError {
    PersistenceError::Database(sqlx::Error::Protocol(format!("injected failure: {what}")))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_source(&self, source: &SourceUpsert<'_>) -> Result<String, PersistenceError> {
        if lock(&self.failures).upsert_paths.contains(source.file_path) {
            return Err(injected(source.file_path));
        }

        let ts = now();
        let mut rows = lock(&self.sources);
        if let Some(row) = rows
            .iter_mut()
            .find(|r| r.project_id == source.project_id && r.file_path == source.file_path)
        {
            row.file_name = source.file_name.to_string();
            row.summary = source.summary.to_string();
            row.source_code = source.source_code.to_string();
            row.content_hash = source.content_hash.to_string();
            row.embedding = None;
            row.updated_at = ts;
            return Ok(row.id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        rows.push(SourceRecord {
            id: id.clone(),
            project_id: source.project_id.to_string(),
            file_name: source.file_name.to_string(),
            file_path: source.file_path.to_string(),
            summary: source.summary.to_string(),
            source_code: source.source_code.to_string(),
            content_hash: source.content_hash.to_string(),
            embedding: None,
            created_at: ts,
            updated_at: ts,
        });
        Ok(id)
    }

    async fn set_embedding(&self, row_id: &str, vector: &[f32]) -> Result<(), PersistenceError> {
        let mut rows = lock(&self.sources);
        let row = rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("source record {row_id}")))?;

        if lock(&self.failures).embedding_paths.contains(&row.file_path) {
            return Err(injected(&row.file_path));
        }
        row.embedding = Some(vector.to_vec());
        row.updated_at = now();
        Ok(())
    }

    async fn find_source(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Option<SourceRecord>, PersistenceError> {
        Ok(lock(&self.sources)
            .iter()
            .find(|r| r.project_id == project_id && r.file_path == file_path)
            .cloned())
    }

    async fn top_k(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<FileReference>, PersistenceError> {
        if lock(&self.failures).retrievals {
            return Err(injected("retrieval"));
        }
        let rows = lock(&self.sources);
        let mut scored: Vec<FileReference> = rows
            .iter()
            .filter(|r| r.project_id == project_id)
            .filter_map(|r| {
                r.embedding.as_ref().map(|v| FileReference {
                    file_name: r.file_name.clone(),
                    summary: r.summary.clone(),
                    source_code: r.source_code.clone(),
                    similarity: cosine_similarity(v, query),
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        Ok(scored)
    }

    async fn clear_project(&self, project_id: &str) -> Result<u64, PersistenceError> {
        let mut rows = lock(&self.sources);
        let before = rows.len();
        rows.retain(|r| r.project_id != project_id);
        Ok((before - rows.len()) as u64)
    }

    async fn source_counts(&self, project_id: &str) -> Result<(u64, u64), PersistenceError> {
        let rows = lock(&self.sources);
        let mine = rows.iter().filter(|r| r.project_id == project_id);
        let (total, embedded) = mine.fold((0u64, 0u64), |(t, e), r| {
            (t + 1, e + u64::from(r.embedding.is_some()))
        });
        Ok((total, embedded))
    }

    async fn save_question(&self, record: &QuestionRecord) -> Result<(), PersistenceError> {
        if lock(&self.failures).question_writes {
            return Err(injected("question"));
        }
        lock(&self.questions).push(record.clone());
        Ok(())
    }

    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>, PersistenceError> {
        let mut out: Vec<QuestionRecord> = lock(&self.questions)
            .iter()
            .rev()
            .filter(|q| q.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_question(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut qs = lock(&self.questions);
        let before = qs.len();
        qs.retain(|q| q.id != id);
        Ok(qs.len() < before)
    }

    async fn clear_questions(&self, project_id: &str) -> Result<u64, PersistenceError> {
        let mut qs = lock(&self.questions);
        let before = qs.len();
        qs.retain(|q| q.project_id != project_id);
        Ok((before - qs.len()) as u64)
    }

    async fn commit_hashes(&self, project_id: &str) -> Result<HashSet<String>, PersistenceError> {
        Ok(lock(&self.commits)
            .iter()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.commit_hash.clone())
            .collect())
    }

    async fn upsert_commits(&self, commits: &[CommitRecord]) -> Result<usize, PersistenceError> {
        let mut rows = lock(&self.commits);
        for c in commits {
            match rows
                .iter_mut()
                .find(|r| r.project_id == c.project_id && r.commit_hash == c.commit_hash)
            {
                Some(existing) => {
                    let summary = c.summary.clone().or_else(|| existing.summary.take());
                    *existing = CommitRecord {
                        summary,
                        ..c.clone()
                    };
                }
                None => rows.push(c.clone()),
            }
        }
        Ok(commits.len())
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>, PersistenceError> {
        let mut out: Vec<CommitRecord> = lock(&self.commits)
            .iter()
            .rev()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.commit_date.cmp(&a.commit_date));
        Ok(out)
    }

    async fn insert_project(&self, project: &Project) -> Result<(), PersistenceError> {
        let mut projects = lock(&self.projects);
        if projects
            .iter()
            .any(|p| p.id == project.id || p.name == project.name)
        {
            return Err(injected("duplicate project"));
        }
        projects.push(project.clone());
        Ok(())
    }

    async fn get_project(&self, id_or_name: &str) -> Result<Option<Project>, PersistenceError> {
        let projects = lock(&self.projects);
        Ok(projects
            .iter()
            .find(|p| p.id == id_or_name)
            .or_else(|| projects.iter().find(|p| p.name == id_or_name))
            .cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, PersistenceError> {
        Ok(lock(&self.projects).clone())
    }

    async fn delete_project(&self, id: &str) -> Result<bool, PersistenceError> {
        lock(&self.sources).retain(|r| r.project_id != id);
        lock(&self.questions).retain(|q| q.project_id != id);
        lock(&self.commits).retain(|c| c.project_id != id);
        let mut projects = lock(&self.projects);
        let before = projects.len();
        projects.retain(|p| p.id != id);
        Ok(projects.len() < before)
    }
}
