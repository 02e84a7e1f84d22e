//! Commit summarizer.
//!
//! Polls a project's repository for recent commits, works out which ones are
//! not stored yet, summarizes each new commit's diff, and writes them all in
//! one batch. Summaries are produced concurrently with all-settle semantics;
//! a commit whose diff cannot be fetched or summarized still gets a row,
//! carrying the keyword summary of its message.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{summarize_commit, ModelAdapter, Summarizer};
use crate::error::{LoadError, PollError, PersistenceError};
use crate::loader::{GitHubLoader, RepoRef};
use crate::models::{CommitPollReport, CommitRecord, Project};
use crate::settle::{bounded, settle_all};
use crate::store::Store;

/// A commit as reported by the repository host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: Option<String>,
    /// RFC 3339.
    pub date: String,
}

/// Where commits and their diffs come from.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Most recent commits on the repository's branch, newest first.
    async fn recent_commits(
        &self,
        repo: &RepoRef,
        limit: usize,
        credential: Option<&str>,
    ) -> Result<Vec<RemoteCommit>, LoadError>;

    /// Unified diff of one commit.
    async fn commit_diff(
        &self,
        repo: &RepoRef,
        hash: &str,
        credential: Option<&str>,
    ) -> Result<String, LoadError>;
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    #[serde(default)]
    author: Option<ApiUser>,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiSignature>,
}

#[derive(Deserialize)]
struct ApiSignature {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct ApiUser {
    avatar_url: Option<String>,
}

#[async_trait]
impl CommitSource for GitHubLoader {
    async fn recent_commits(
        &self,
        repo: &RepoRef,
        limit: usize,
        credential: Option<&str>,
    ) -> Result<Vec<RemoteCommit>, LoadError> {
        let mut url: Url =
            self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str(), "commits"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("per_page", &limit.clamp(1, 100).to_string());
            if let Some(branch) = &repo.branch {
                query.append_pair("sha", branch);
            }
        }

        let commits: Vec<ApiCommit> = self
            .get(url, "application/vnd.github+json", credential, repo)
            .await?
            .json()
            .await?;

        Ok(commits
            .into_iter()
            .take(limit)
            .map(|c| {
                let signature = c.commit.author;
                RemoteCommit {
                    hash: c.sha,
                    message: c.commit.message,
                    author_name: signature
                        .as_ref()
                        .and_then(|s| s.name.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                    author_avatar: c.author.and_then(|a| a.avatar_url),
                    date: signature.and_then(|s| s.date).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn commit_diff(
        &self,
        repo: &RepoRef,
        hash: &str,
        credential: Option<&str>,
    ) -> Result<String, LoadError> {
        let url = self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str(), "commits", hash])?;
        Ok(self
            .get(url, "application/vnd.github.diff", credential, repo)
            .await?
            .text()
            .await?)
    }
}

pub struct CommitPoller {
    store: Arc<dyn Store>,
    adapter: Arc<dyn ModelAdapter>,
    source: Arc<dyn CommitSource>,
    limit: usize,
    concurrency: usize,
    call_timeout: Duration,
}

impl CommitPoller {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<dyn ModelAdapter>,
        source: Arc<dyn CommitSource>,
        limit: usize,
    ) -> Self {
        Self {
            store,
            adapter,
            source,
            limit,
            concurrency: 4,
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize, call_timeout: Duration) -> Self {
        self.concurrency = concurrency;
        self.call_timeout = call_timeout;
        self
    }

    /// Fetch, summarize, and store the commits of `project` not seen before.
    pub async fn poll(
        &self,
        project: &Project,
        credential: Option<&str>,
    ) -> Result<CommitPollReport, PollError> {
        let repo = RepoRef::parse(&project.repo_url)?.with_branch(project.branch.as_deref());

        let remote = self
            .source
            .recent_commits(&repo, self.limit, credential)
            .await?;
        let known = bounded(
            self.call_timeout,
            self.store.commit_hashes(&project.id),
            PersistenceError::Timeout,
        )
        .await?;

        let fresh: Vec<RemoteCommit> = remote
            .iter()
            .filter(|c| !known.contains(&c.hash))
            .cloned()
            .collect();

        let mut report = CommitPollReport {
            fetched: remote.len(),
            new_commits: fresh.len(),
            ..Default::default()
        };
        if fresh.is_empty() {
            tracing::info!(project = %project.name, fetched = remote.len(), "no new commits");
            return Ok(report);
        }

        let summarized = settle_all(fresh.iter(), self.concurrency, |commit| {
            self.summarize(&repo, commit, credential)
        })
        .await;

        let mut rows = Vec::with_capacity(fresh.len());
        for (commit, outcome) in fresh.iter().zip(summarized) {
            let (summary, strategy) = match outcome {
                Ok(pair) => pair,
                Err(never) => match never {},
            };
            match strategy {
                Summarizer::Ai => report.ai_summaries += 1,
                Summarizer::Pattern => report.fallback_summaries += 1,
            }
            rows.push(CommitRecord {
                project_id: project.id.clone(),
                commit_hash: commit.hash.clone(),
                commit_message: commit.message.clone(),
                commit_author_name: commit.author_name.clone(),
                commit_author_avatar: commit.author_avatar.clone(),
                commit_date: commit.date.clone(),
                summary: Some(summary),
            });
        }

        bounded(
            self.call_timeout,
            self.store.upsert_commits(&rows),
            PersistenceError::Timeout,
        )
        .await?;

        tracing::info!(
            project = %project.name,
            fetched = report.fetched,
            new = report.new_commits,
            ai = report.ai_summaries,
            fallback = report.fallback_summaries,
            "commits polled"
        );
        Ok(report)
    }

    /// Always produces a summary; the `Result` is only there for `settle_all`.
    async fn summarize(
        &self,
        repo: &RepoRef,
        commit: &RemoteCommit,
        credential: Option<&str>,
    ) -> Result<(String, Summarizer), std::convert::Infallible> {
        let diff = match bounded(
            self.call_timeout,
            self.source.commit_diff(repo, &commit.hash, credential),
            |secs| LoadError::Transport(format!("diff fetch timed out after {secs}s")),
        )
        .await
        {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(commit = %commit.hash, error = %e, "could not fetch diff");
                None
            }
        };

        let summary = summarize_commit(
            &*self.adapter,
            diff.as_deref(),
            &commit.message,
            self.call_timeout,
        )
        .await;
        Ok((summary.text, summary.strategy))
    }
}
