//! Relevance filter applied between the loader and the indexing pipeline.
//!
//! A document is kept only if all of these hold, checked in order:
//!
//! 1. Its content is non-empty after trimming.
//! 2. Its content is at most `max_file_bytes` long. Larger files are skipped,
//!    never truncated.
//! 3. Its extension (or bare file name, for `Dockerfile` and friends) is on
//!    the allow-list.
//! 4. Its path matches none of the skip patterns.
//!
//! [`RelevanceFilter::apply`] is pure: the output preserves input order and
//! filtering an already-filtered list changes nothing.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::IndexingConfig;
use crate::models::{file_name_of, Document};

const ALLOWED_EXTENSIONS: &[&str] = &[
    // source
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "kts", "scala", "rb",
    "php", "c", "h", "cc", "cpp", "hpp", "cs", "swift", "m", "dart", "lua", "ex", "exs", "erl",
    "hs", "clj", "elm", "vue", "svelte", "sql", "sh", "bash", "zsh", "ps1", "r", "jl", "zig",
    "nim", "proto", "graphql", "gql",
    // markup and docs
    "md", "mdx", "rst", "txt", "adoc", "html", "htm", "css", "scss", "sass", "less",
    // config
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", "gradle", "tf", "nix",
];

const ALLOWED_FILE_NAMES: &[&str] = &[
    "Dockerfile",
    "Makefile",
    "Rakefile",
    "Gemfile",
    "Procfile",
    "Justfile",
];

const SKIP_PATTERNS: &[&str] = &[
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/*.lock",
    "**/.env",
    "**/.env.*",
    "**/vendor/**",
    "**/third_party/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/target/**",
    "**/*.min.*",
    "**/*.generated.*",
];

/// Compiled relevance rules.
pub struct RelevanceFilter {
    max_file_bytes: usize,
    skip: GlobSet,
}

impl RelevanceFilter {
    /// Build the filter; `extra_skip_globs` are added to the built-in skip list.
    pub fn new(max_file_bytes: usize, extra_skip_globs: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in SKIP_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in extra_skip_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            max_file_bytes,
            skip: builder.build()?,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self> {
        Self::new(config.max_file_bytes, &config.extra_skip_globs)
    }

    pub fn keep(&self, doc: &Document) -> bool {
        !doc.content.trim().is_empty()
            && doc.content.len() <= self.max_file_bytes
            && has_allowed_type(&doc.path)
            && !self.skip.is_match(&doc.path)
    }

    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter().filter(|d| self.keep(d)).collect()
    }
}

fn has_allowed_type(path: &str) -> bool {
    let name = file_name_of(path);
    if ALLOWED_FILE_NAMES.contains(&name) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}
