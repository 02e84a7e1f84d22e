//! Loader backed by a local `git` checkout.
//!
//! Workflow:
//! 1. Pick a cache directory for the repository under the configured root.
//! 2. Shallow-clone it, or fetch and hard-reset an existing checkout.
//!    The remote URL never carries a credential; a token is handed to each
//!    network command as a one-off `http.extraHeader`, so nothing secret
//!    lands in `.git/config`.
//! 3. Walk the working tree, skipping `.git` and the static ignore list.
//! 4. Read every remaining file that is small enough and valid UTF-8.
//!
//! Git runs as a blocking subprocess on the blocking thread pool.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use super::{finish, DocumentLoader, IgnoreRules, RepoRef, MAX_LOADED_FILE_BYTES};
use crate::error::LoadError;
use crate::models::Document;

pub struct GitCloneLoader {
    cache_root: PathBuf,
    remote_base: String,
}

impl GitCloneLoader {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            remote_base: "https://github.com".to_string(),
        }
    }

    /// Clone from a different host, e.g. a local mirror.
    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        self.remote_base = base.into();
        self
    }

    fn checkout_dir(&self, repo: &RepoRef) -> PathBuf {
        let key = format!("{}/{}", self.remote_base, repo.slug());
        self.cache_root
            .join(format!("{}__{}-{}", repo.owner, repo.name, short_hash(&key)))
    }

    fn remote_url(&self, repo: &RepoRef) -> String {
        let base = self.remote_base.trim_end_matches('/');
        format!("{base}/{}.git", repo.slug())
    }
}

#[async_trait]
impl DocumentLoader for GitCloneLoader {
    fn name(&self) -> &str {
        "git"
    }

    async fn load(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
    ) -> Result<Vec<Document>, LoadError> {
        let dest = self.checkout_dir(repo);
        let url = self.remote_url(repo);
        let auth = auth_args(credential);
        let branch = repo.branch.clone();
        let slug = repo.slug();

        tokio::task::spawn_blocking(move || {
            if dest.join(".git").exists() {
                git_refresh(&dest, &url, &auth, branch.as_deref(), &slug)?;
            } else {
                git_clone(&url, &auth, branch.as_deref(), &dest, &slug)?;
            }
            read_checkout(&dest, &IgnoreRules::standard())
        })
        .await
        .map_err(|e| LoadError::Transport(format!("git task failed: {e}")))?
    }
}

/// Per-invocation config that authenticates a single git command. Must come
/// before the subcommand.
fn auth_args(credential: Option<&str>) -> Vec<String> {
    match credential {
        Some(token) => vec![
            "-c".to_string(),
            format!("http.extraHeader=Authorization: Bearer {token}"),
        ],
        None => Vec::new(),
    }
}

fn git_clone(
    url: &str,
    auth: &[String],
    branch: Option<&str>,
    dest: &Path,
    slug: &str,
) -> Result<(), LoadError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            LoadError::Transport(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let mut cmd = Command::new("git");
    cmd.args(auth)
        .args(["clone", "--depth", "1", "--single-branch"]);
    if let Some(b) = branch {
        cmd.args(["--branch", b]);
    }
    cmd.arg(url).arg(dest);
    // Never block on an interactive credential prompt.
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    run(cmd, "clone", slug)
}

fn git_refresh(
    repo_dir: &Path,
    url: &str,
    auth: &[String],
    branch: Option<&str>,
    slug: &str,
) -> Result<(), LoadError> {
    // Checkouts made with a tokenized origin get scrubbed here.
    let mut set_url = Command::new("git");
    set_url
        .args(["remote", "set-url", "origin", url])
        .current_dir(repo_dir);
    run(set_url, "remote set-url", slug)?;

    let mut fetch = Command::new("git");
    fetch
        .args(auth)
        .args(["fetch", "--depth", "1", "origin", branch.unwrap_or("HEAD")])
        .current_dir(repo_dir)
        .env("GIT_TERMINAL_PROMPT", "0");
    run(fetch, "fetch", slug)?;

    let mut reset = Command::new("git");
    reset
        .args(["reset", "--hard", "FETCH_HEAD"])
        .current_dir(repo_dir);
    run(reset, "reset", slug)
}

fn run(mut cmd: Command, action: &str, slug: &str) -> Result<(), LoadError> {
    let output = cmd
        .output()
        .map_err(|e| LoadError::Transport(format!("failed to execute 'git {action}': {e}")))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(classify_stderr(&stderr, action, slug))
}

/// Git reports every failure with exit code 128, so the message decides.
fn classify_stderr(stderr: &str, action: &str, slug: &str) -> LoadError {
    let lower = stderr.to_lowercase();
    if lower.contains("not found") || lower.contains("does not exist") {
        LoadError::NotFound(slug.to_string())
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        LoadError::Unauthorized(slug.to_string())
    } else if lower.contains("rate limit") {
        LoadError::RateLimited { reset_at: None }
    } else {
        LoadError::Transport(format!("git {action} failed: {}", stderr.trim()))
    }
}

/// Read every eligible file under `root` into documents with `/`-separated
/// relative paths.
pub(crate) fn read_checkout(root: &Path, ignore: &IgnoreRules) -> Result<Vec<Document>, LoadError> {
    let mut docs = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| LoadError::Transport(format!("walk failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if ignore.is_ignored(&rel_str) {
            continue;
        }
        let too_big = entry
            .metadata()
            .map(|m| m.len() > MAX_LOADED_FILE_BYTES)
            .unwrap_or(true);
        if too_big {
            tracing::debug!(path = %rel_str, "skipping oversized file");
            continue;
        }

        let bytes = std::fs::read(path)
            .map_err(|e| LoadError::Transport(format!("cannot read {rel_str}: {e}")))?;
        match String::from_utf8(bytes) {
            Ok(content) => docs.push(Document::new(rel_str, content)),
            Err(_) => tracing::debug!(path = %rel_str, "skipping non-UTF-8 file"),
        }
    }

    Ok(finish(docs))
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}
