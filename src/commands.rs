//! CLI command implementations.
//!
//! Each `run_*` function opens the database, performs one operation, and
//! prints a human-readable summary to stdout. Diagnostics go through
//! `tracing` to stderr.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{create_adapter, ModelAdapter};
use crate::commits::CommitPoller;
use crate::config::Config;
use crate::filter::RelevanceFilter;
use crate::index::{index_repository, IndexOptions, Indexer};
use crate::loader::{create_loader, GitHubLoader, LoaderKind};
use crate::projects::{create_project, remove_project, resolve_project};
use crate::prompt::truncate_chars;
use crate::query::QueryEngine;
use crate::store::{SqliteStore, Store};

async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let pool = crate::db::open(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn call_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.indexing.call_timeout_secs)
}

pub async fn run_init(config: &Config) -> Result<()> {
    crate::db::open(config).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

pub async fn run_project_add(
    config: &Config,
    name: &str,
    repo_url: &str,
    branch: Option<&str>,
) -> Result<()> {
    let store = open_store(config).await?;
    let project = create_project(store.as_ref(), name, repo_url, branch).await?;
    println!("Created project '{}' ({})", project.name, project.id);
    Ok(())
}

pub async fn run_project_list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let projects = store.list_projects().await?;
    if projects.is_empty() {
        println!("No projects. Add one with `repo-rag project add <name> <repo>`.");
        return Ok(());
    }

    println!("{:<20} {:<40} {:>8} {:>8}", "NAME", "REPOSITORY", "FILES", "EMBEDDED");
    for project in projects {
        let (files, embedded) = store.source_counts(&project.id).await?;
        let repo = match &project.branch {
            Some(b) => format!("{}@{}", project.repo_url, b),
            None => project.repo_url.clone(),
        };
        println!("{:<20} {:<40} {:>8} {:>8}", project.name, repo, files, embedded);
    }
    Ok(())
}

pub async fn run_project_remove(config: &Config, project: &str) -> Result<()> {
    let store = open_store(config).await?;
    let removed = remove_project(store.as_ref(), project).await?;
    println!("Removed project '{}' and all its records", removed.name);
    Ok(())
}

pub async fn run_index(
    config: &Config,
    project: &str,
    skip_existing: bool,
    loader: LoaderKind,
) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let adapter = create_adapter(&config.model)?;
    if !config.model.is_enabled() {
        println!("Model provider is disabled: summaries will use the pattern fallback and no file will be embedded.");
    }

    let mut options = IndexOptions::from_config(&config.indexing);
    options.skip_existing |= skip_existing;
    let filter = RelevanceFilter::from_config(&config.indexing)?;
    let loader = create_loader(loader, config);
    let indexer = Indexer::new(store, adapter, options);
    let token = config.github.token();

    let report = index_repository(&indexer, loader.as_ref(), &filter, &project, token.as_deref()).await?;

    println!(
        "Indexed {}: {} processed, {} skipped, {} failed in {}ms",
        project.name,
        report.processed_count,
        report.skipped_count,
        report.errors.len(),
        report.duration_ms
    );
    if report.fallback_summaries > 0 {
        println!("  {} file(s) used the pattern summary", report.fallback_summaries);
    }
    for error in &report.errors {
        println!("  error: {}", error);
    }
    if !report.success {
        bail!("indexing failed for every file of {}", project.name);
    }
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    project: &str,
    question: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let adapter: Arc<dyn ModelAdapter> = create_adapter(&config.model)?;
    let engine = QueryEngine::new(store, adapter, config.retrieval.clone(), call_timeout(config));

    let answer = engine.ask(&project.id, question, top_k).await?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. {} (similarity {:.3})",
                i + 1,
                source.file_name,
                source.similarity
            );
        }
    }
    Ok(())
}

pub async fn run_questions_list(config: &Config, project: &str) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let questions = store.list_questions(&project.id).await?;
    if questions.is_empty() {
        println!("No saved questions for {}.", project.name);
        return Ok(());
    }
    for q in questions {
        let when = chrono::DateTime::from_timestamp(q.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{}  {}  {}", q.id, when, q.question);
        println!("    {}", truncate_chars(&q.answer, 160).replace('\n', " "));
    }
    Ok(())
}

pub async fn run_questions_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if !store.delete_question(id).await? {
        bail!("no question with id {}", id);
    }
    println!("Deleted question {}", id);
    Ok(())
}

pub async fn run_questions_clear(config: &Config, project: &str) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let deleted = store.clear_questions(&project.id).await?;
    println!("Deleted {} question(s) from {}", deleted, project.name);
    Ok(())
}

pub async fn run_clear(config: &Config, project: &str) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let deleted = store.clear_project(&project.id).await?;
    println!("Deleted {} retrieval record(s) from {}", deleted, project.name);
    Ok(())
}

pub async fn run_commits_poll(config: &Config, project: &str) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let adapter = create_adapter(&config.model)?;
    let source = Arc::new(GitHubLoader::new(&config.github.api_url));
    let poller = CommitPoller::new(store, adapter, source, config.github.commit_limit)
        .with_concurrency(config.indexing.concurrency, call_timeout(config));
    let token = config.github.token();

    let report = poller.poll(&project, token.as_deref()).await?;
    println!(
        "Fetched {} commit(s) for {}: {} new ({} AI summaries, {} fallback)",
        report.fetched,
        project.name,
        report.new_commits,
        report.ai_summaries,
        report.fallback_summaries
    );
    Ok(())
}

pub async fn run_commits_list(config: &Config, project: &str, limit: Option<usize>) -> Result<()> {
    let store = open_store(config).await?;
    let project = resolve_project(store.as_ref(), project).await?;
    let commits = store.list_commits(&project.id).await?;
    if commits.is_empty() {
        println!("No commits stored for {}. Run `repo-rag commits poll {}`.", project.name, project.name);
        return Ok(());
    }
    for c in commits.iter().take(limit.unwrap_or(usize::MAX)) {
        let short = truncate_chars(&c.commit_hash, 7);
        let subject = c.commit_message.lines().next().unwrap_or_default();
        println!("{}  {}  {}  {}", short, c.commit_date, c.commit_author_name, subject);
        if let Some(summary) = &c.summary {
            println!("    {}", summary.replace('\n', " "));
        }
    }
    Ok(())
}
