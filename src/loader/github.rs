//! GitHub REST API loader.
//!
//! Three calls per repository: the repository itself (to learn the default
//! branch when none is given), the recursive git tree of that ref, and one
//! raw content fetch per surviving blob.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::{finish, DocumentLoader, IgnoreRules, RepoRef, MAX_LOADED_FILE_BYTES};
use crate::error::LoadError;
use crate::models::Document;
use crate::settle::settle_all;

const FETCH_CONCURRENCY: usize = 8;

pub struct GitHubLoader {
    client: reqwest::Client,
    api_url: String,
    ignore: IgnoreRules,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

impl GitHubLoader {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            ignore: IgnoreRules::standard(),
        }
    }

    pub(crate) fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, LoadError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| LoadError::InvalidReference(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|_| LoadError::InvalidReference(self.api_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn get(
        &self,
        url: Url,
        accept: &str,
        credential: Option<&str>,
        repo: &RepoRef,
    ) -> Result<reqwest::Response, LoadError> {
        let mut req = self
            .client
            .get(url)
            .header(USER_AGENT, "repo-rag")
            .header(ACCEPT, accept);
        if let Some(token) = credential {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(classify(response.status(), response.headers(), &repo.slug()))
    }

    async fn default_branch(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
    ) -> Result<String, LoadError> {
        let url = self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str()])?;
        let info: RepoInfo = self
            .get(url, "application/vnd.github+json", credential, repo)
            .await?
            .json()
            .await?;
        Ok(info.default_branch)
    }

    async fn fetch_file(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: &str,
        credential: Option<&str>,
    ) -> Result<Option<Document>, LoadError> {
        let mut url = self.endpoint(
            ["repos", repo.owner.as_str(), repo.name.as_str(), "contents"]
                .into_iter()
                .chain(path.split('/')),
        )?;
        url.query_pairs_mut().append_pair("ref", git_ref);

        let bytes = self
            .get(url, "application/vnd.github.raw", credential, repo)
            .await?
            .bytes()
            .await?;

        // Binary content is skipped rather than reported.
        Ok(String::from_utf8(bytes.to_vec())
            .ok()
            .map(|content| Document::new(path, content)))
    }
}

#[async_trait]
impl DocumentLoader for GitHubLoader {
    fn name(&self) -> &str {
        "github"
    }

    async fn load(
        &self,
        repo: &RepoRef,
        credential: Option<&str>,
    ) -> Result<Vec<Document>, LoadError> {
        let git_ref = match &repo.branch {
            Some(b) => b.clone(),
            None => self.default_branch(repo, credential).await?,
        };

        let mut url = self.endpoint([
            "repos",
            repo.owner.as_str(),
            repo.name.as_str(),
            "git",
            "trees",
            git_ref.as_str(),
        ])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: Tree = self
            .get(url, "application/vnd.github+json", credential, repo)
            .await?
            .json()
            .await?;
        if tree.truncated {
            tracing::warn!(repo = %repo, "GitHub truncated the tree listing; some files are missing");
        }

        let paths: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .filter(|e| e.size.unwrap_or(0) <= MAX_LOADED_FILE_BYTES)
            .filter(|e| !self.ignore.is_ignored(&e.path))
            .map(|e| e.path)
            .collect();

        tracing::debug!(repo = %repo, git_ref = %git_ref, files = paths.len(), "fetching file contents");

        let results = settle_all(paths.iter(), FETCH_CONCURRENCY, |path| {
            self.fetch_file(repo, &git_ref, path, credential)
        })
        .await;

        let mut docs = Vec::with_capacity(results.len());
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => tracing::debug!(path = %path, "skipping non-UTF-8 file"),
                // Losing access mid-run invalidates the whole snapshot.
                Err(e @ (LoadError::RateLimited { .. } | LoadError::Unauthorized(_))) => {
                    return Err(e)
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "failed to fetch file, skipping"),
            }
        }

        Ok(finish(docs))
    }
}

/// Map a non-success response to the matching [`LoadError`].
fn classify(status: StatusCode, headers: &HeaderMap, slug: &str) -> LoadError {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let exhausted = header("x-ratelimit-remaining") == Some("0");
    let reset_at = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok());

    match status {
        StatusCode::NOT_FOUND => LoadError::NotFound(slug.to_string()),
        StatusCode::TOO_MANY_REQUESTS => LoadError::RateLimited { reset_at },
        StatusCode::FORBIDDEN if exhausted => LoadError::RateLimited { reset_at },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LoadError::Unauthorized(slug.to_string())
        }
        other => LoadError::Transport(format!("GitHub API returned {other} for {slug}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_repo(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "default_branch": "main" })),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/main"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "truncated": false,
                "tree": [
                    { "path": "src", "type": "tree" },
                    { "path": "src/b.ts", "type": "blob", "size": 12 },
                    { "path": "src/a.ts", "type": "blob", "size": 40 },
                    { "path": "package-lock.json", "type": "blob", "size": 90 },
                    { "path": "node_modules/x/index.js", "type": "blob", "size": 5 },
                    { "path": "big.sql", "type": "blob", "size": 5_000_000 }
                ]
            })))
            .mount(server)
            .await;
        for (p, body) in [
            ("/repos/acme/widgets/contents/src/a.ts", "export const a = 1;"),
            ("/repos/acme/widgets/contents/src/b.ts", "export const b = 2;"),
        ] {
            Mock::given(method("GET"))
                .and(path(p))
                .and(query_param("ref", "main"))
                .and(header("accept", "application/vnd.github.raw"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn test_load_resolves_default_branch_and_ignores() {
        let server = MockServer::start().await;
        mount_repo(&server).await;

        let loader = GitHubLoader::new(&server.uri());
        let repo = RepoRef::parse("acme/widgets").unwrap();
        let docs = loader.load(&repo, None).await.unwrap();

        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.ts"]);
        assert_eq!(docs[0].content, "export const a = 1;");
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = GitHubLoader::new(&server.uri());
        let repo = RepoRef::parse("acme/missing").unwrap();
        assert!(matches!(
            loader.load(&repo, None).await,
            Err(LoadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_without_rate_limit_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "42"))
            .mount(&server)
            .await;

        let loader = GitHubLoader::new(&server.uri());
        let repo = RepoRef::parse("acme/private").unwrap();
        assert!(matches!(
            loader.load(&repo, Some("bad-token")).await,
            Err(LoadError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_exhausted_quota_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1700000000"),
            )
            .mount(&server)
            .await;

        let loader = GitHubLoader::new(&server.uri());
        let repo = RepoRef::parse("acme/widgets").unwrap();
        match loader.load(&repo, None).await {
            Err(LoadError::RateLimited { reset_at }) => assert_eq!(reset_at, Some(1_700_000_000)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_branch_skips_repo_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/trees/dev"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tree": [] })),
            )
            .mount(&server)
            .await;

        let loader = GitHubLoader::new(&server.uri());
        let repo = RepoRef::parse("acme/widgets").unwrap().with_branch(Some("dev"));
        assert!(loader.load(&repo, None).await.unwrap().is_empty());
    }
}
