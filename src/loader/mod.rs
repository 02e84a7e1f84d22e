//! Repository loaders.
//!
//! A [`DocumentLoader`] turns a [`RepoRef`] into an ordered list of
//! [`Document`]s. Two implementations ship with the crate:
//!
//! | Loader | Transport | Notes |
//! |--------|-----------|-------|
//! | [`GitHubLoader`] | GitHub REST API | No local disk use; subject to API rate limits |
//! | [`GitCloneLoader`] | `git clone --depth 1` | Needs `git` on `PATH`; keeps a checkout cache |
//!
//! Both resolve the default branch when the reference names none, drop paths
//! matched by the static [`IgnoreRules`], skip files larger than
//! [`MAX_LOADED_FILE_BYTES`] or not valid UTF-8, and return documents sorted
//! by path. Neither retries: a [`LoadError`] goes straight back to the caller,
//! which can inspect [`LoadError::is_retryable`].

mod git;
pub(crate) mod github;

pub use git::GitCloneLoader;
pub use github::GitHubLoader;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;

use crate::config::Config;
use crate::error::LoadError;
use crate::models::Document;

/// Files above this size never leave the loader. The relevance filter applies
/// its own, usually lower, ceiling afterwards.
pub const MAX_LOADED_FILE_BYTES: u64 = 1_000_000;

/// Paths that never reach the pipeline: dependency trees, build output,
/// lockfiles, minified assets, coverage reports, and common binary formats.
const STATIC_IGNORE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/bower_components/**",
    "**/vendor/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/target/**",
    "**/.next/**",
    "**/.nuxt/**",
    "**/coverage/**",
    "**/.nyc_output/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/bun.lockb",
    "**/Cargo.lock",
    "**/poetry.lock",
    "**/Gemfile.lock",
    "**/composer.lock",
    "**/go.sum",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
    "**/*.{png,jpg,jpeg,gif,bmp,ico,webp,svg}",
    "**/*.{pdf,zip,gz,tgz,tar,7z,rar,jar,war}",
    "**/*.{woff,woff2,ttf,otf,eot}",
    "**/*.{mp3,mp4,mov,avi,wav}",
    "**/*.{exe,dll,so,dylib,a,o,class,pyc,wasm}",
];

/// Compiled form of the static ignore list.
pub struct IgnoreRules {
    set: GlobSet,
}

impl IgnoreRules {
    /// The built-in rule set.
    pub fn standard() -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in STATIC_IGNORE_GLOBS {
            // Patterns are compile-time constants covered by tests.
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        let set = builder.build().unwrap_or_else(|_| GlobSet::empty());
        Self { set }
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

/// A GitHub repository plus an optional branch or ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: Option<String>,
}

impl RepoRef {
    /// Parse `owner/repo`, `https://github.com/owner/repo(.git)`, or
    /// `git@github.com:owner/repo.git`.
    pub fn parse(input: &str) -> Result<Self, LoadError> {
        let trimmed = input.trim().trim_end_matches('/');
        let invalid = || LoadError::InvalidReference(input.to_string());

        let path = if let Some(rest) = trimmed.strip_prefix("git@github.com:") {
            rest
        } else if let Some(idx) = trimmed.find("github.com/") {
            &trimmed[idx + "github.com/".len()..]
        } else if trimmed.contains("://") || trimmed.contains('@') {
            return Err(invalid());
        } else {
            trimmed
        };

        let mut parts = path.split('/');
        let owner = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let name = parts
            .next()
            .map(|s| s.trim_end_matches(".git"))
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        // `https://github.com/o/r/tree/<branch>` names a branch.
        let branch = match (parts.next(), parts.next()) {
            (Some("tree"), Some(b)) if !b.is_empty() => Some(b.to_string()),
            (None, _) => None,
            _ => return Err(invalid()),
        };

        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch,
        })
    }

    /// Override the branch; `None` keeps whatever was parsed.
    pub fn with_branch(mut self, branch: Option<&str>) -> Self {
        if let Some(b) = branch.filter(|b| !b.trim().is_empty()) {
            self.branch = Some(b.to_string());
        }
        self
    }

    /// `owner/name`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.branch {
            Some(b) => write!(f, "{}/{}@{}", self.owner, self.name, b),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}

/// Produces the documents of one repository snapshot.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Short identifier for logs (`"github"`, `"git"`).
    fn name(&self) -> &str;

    /// Load every non-ignored text file. `credential` is an access token.
    async fn load(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
    ) -> Result<Vec<Document>, LoadError>;
}

/// Which loader `index` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LoaderKind {
    #[default]
    Github,
    Git,
}

pub fn create_loader(kind: LoaderKind, config: &Config) -> Box<dyn DocumentLoader> {
    match kind {
        LoaderKind::Github => Box::new(GitHubLoader::new(&config.github.api_url)),
        LoaderKind::Git => {
            let cache_dir = config.github.cache_dir.clone().unwrap_or_else(|| {
                config
                    .db
                    .path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."))
                    .join(".repo-cache")
            });
            Box::new(GitCloneLoader::new(cache_dir))
        }
    }
}

/// Sort by path so every loader hands out the same order.
fn finish(mut docs: Vec<Document>) -> Vec<Document> {
    docs.sort_by(|a, b| a.path.cmp(&b.path));
    docs
}
