//! Indexing pipeline.
//!
//! Turns filtered documents into retrieval records. Every document is
//! processed independently with bounded concurrency:
//!
//! ```text
//! Document ─► summarize ─► embed(summary) ─► upsert row ─► set embedding
//!             (falls back     (no fallback)    (phase 1)     (phase 2)
//!              to pattern)
//! ```
//!
//! A failure at any step is recorded as `"<path>: <reason>"` in the
//! [`IndexReport`] and never stops the other documents. Each model and store
//! call runs under the configured per-call timeout; expiry counts as an
//! ordinary per-file failure.
//!
//! The vector is computed from the summary, not the raw source, so retrieval
//! matches on what a file does rather than on its syntax.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::{summarize_document, ModelAdapter, Summarizer};
use crate::config::IndexingConfig;
use crate::error::{AdapterError, IndexError, PersistenceError};
use crate::filter::RelevanceFilter;
use crate::loader::{DocumentLoader, RepoRef};
use crate::models::{Document, EmbeddingState, IndexReport, Project, SourceUpsert};
use crate::settle::{bounded, settle_all};
use crate::store::Store;

/// Tuning knobs for one indexing run.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub concurrency: usize,
    pub call_timeout: Duration,
    /// Pause before each document, to go easy on the model provider.
    pub delay: Duration,
    /// Skip documents whose stored record is embedded and has the same
    /// content hash.
    pub skip_existing: bool,
}

impl IndexOptions {
    pub fn from_config(config: &IndexingConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            delay: Duration::from_millis(config.delay_ms),
            skip_existing: config.skip_existing,
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from_config(&IndexingConfig::default())
    }
}

enum FileOutcome {
    Indexed { fallback: bool },
    Skipped,
}

pub struct Indexer {
    store: Arc<dyn Store>,
    adapter: Arc<dyn ModelAdapter>,
    options: IndexOptions,
}

impl Indexer {
    pub fn new(store: Arc<dyn Store>, adapter: Arc<dyn ModelAdapter>, options: IndexOptions) -> Self {
        Self {
            store,
            adapter,
            options,
        }
    }

    /// Index `docs` into `project_id`.
    ///
    /// Never fails: per-document problems land in the report's `errors`, in
    /// input order. `success` is false only when there was work to do and
    /// not a single document made it through.
    pub async fn index_documents(&self, project_id: &str, docs: &[Document]) -> IndexReport {
        let started = Instant::now();
        tracing::info!(
            project_id,
            documents = docs.len(),
            adapter = self.adapter.name(),
            "indexing started"
        );

        let outcomes = settle_all(docs.iter(), self.options.concurrency, |doc| {
            self.index_one(project_id, doc)
        })
        .await;

        let mut report = IndexReport {
            success: true,
            ..Default::default()
        };
        for (doc, outcome) in docs.iter().zip(outcomes) {
            match outcome {
                Ok(FileOutcome::Indexed { fallback }) => {
                    report.processed_count += 1;
                    if fallback {
                        report.fallback_summaries += 1;
                    }
                }
                Ok(FileOutcome::Skipped) => report.skipped_count += 1,
                Err(reason) => {
                    tracing::warn!(path = %doc.path, %reason, "failed to index file");
                    report.errors.push(format!("{}: {}", doc.path, reason));
                }
            }
        }

        report.success =
            report.errors.is_empty() || report.processed_count + report.skipped_count > 0;
        report.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            project_id,
            processed = report.processed_count,
            skipped = report.skipped_count,
            errors = report.errors.len(),
            fallback_summaries = report.fallback_summaries,
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        report
    }

    async fn index_one(&self, project_id: &str, doc: &Document) -> Result<FileOutcome, String> {
        let limit = self.options.call_timeout;
        let hash = content_hash(&doc.content);

        if self.options.skip_existing {
            let existing = bounded(
                limit,
                self.store.find_source(project_id, &doc.path),
                PersistenceError::Timeout,
            )
            .await
            .map_err(|e| format!("lookup failed: {e}"))?;

            if let Some(record) = existing {
                if record.state() == EmbeddingState::Embedded && record.content_hash == hash {
                    tracing::debug!(path = %doc.path, "unchanged, skipping");
                    return Ok(FileOutcome::Skipped);
                }
            }
        }

        if !self.options.delay.is_zero() {
            tokio::time::sleep(self.options.delay).await;
        }

        let summary = summarize_document(&*self.adapter, &doc.content, &doc.path, limit).await;

        let vector = bounded(limit, self.adapter.embed(&summary.text), AdapterError::Timeout)
            .await
            .map_err(|e| format!("embedding failed: {e}"))?;

        let row_id = bounded(
            limit,
            self.store.upsert_source(&SourceUpsert {
                project_id,
                file_path: &doc.path,
                file_name: doc.file_name(),
                summary: &summary.text,
                source_code: &doc.content,
                content_hash: &hash,
            }),
            PersistenceError::Timeout,
        )
        .await
        .map_err(|e| format!("saving summary failed: {e}"))?;

        bounded(
            limit,
            self.store.set_embedding(&row_id, &vector),
            PersistenceError::Timeout,
        )
        .await
        .map_err(|e| format!("saving embedding failed: {e}"))?;

        Ok(FileOutcome::Indexed {
            fallback: summary.strategy == Summarizer::Pattern,
        })
    }
}

/// Load, filter, and index a project's repository.
///
/// Only failures that happen before any document is available (bad
/// reference, loader error) are returned as `Err`.
pub async fn index_repository(
    indexer: &Indexer,
    loader: &dyn DocumentLoader,
    filter: &RelevanceFilter,
    project: &Project,
    credential: Option<&str>,
) -> Result<IndexReport, IndexError> {
    let repo = RepoRef::parse(&project.repo_url)?.with_branch(project.branch.as_deref());

    let loaded = loader.load(&repo, credential).await?;
    let loaded_count = loaded.len();
    let docs = filter.apply(loaded);
    tracing::info!(
        repo = %repo,
        loader = loader.name(),
        loaded = loaded_count,
        kept = docs.len(),
        "repository loaded"
    );

    Ok(indexer.index_documents(&project.id, &docs).await)
}

/// Hex SHA-256 of a document's content.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
