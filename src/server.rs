//! JSON HTTP API.
//!
//! Exposes the project registry, the indexing and query pipelines, question
//! history, and the commit summarizer over HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/projects` | List projects |
//! | `POST` | `/projects` | Register a project |
//! | `GET`  | `/projects/{id}` | One project with record counts |
//! | `DELETE` | `/projects/{id}` | Delete a project and everything scoped to it |
//! | `POST` | `/projects/{id}/index` | Load, filter, and index the repository |
//! | `POST` | `/projects/{id}/ask` | Answer a question |
//! | `GET`  | `/projects/{id}/questions` | Question history, newest first |
//! | `DELETE` | `/projects/{id}/questions` | Clear question history |
//! | `DELETE` | `/questions/{id}` | Delete one question |
//! | `DELETE` | `/projects/{id}/embeddings` | Drop every retrieval record |
//! | `POST` | `/projects/{id}/commits/poll` | Fetch and summarize new commits |
//! | `GET`  | `/projects/{id}/commits` | Stored commits, newest first |
//!
//! `{id}` accepts a project id or name.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `timeout` (408), `conflict` (409), `rate_limited` (429), `internal` (500),
//! `upstream_error` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::adapter::{create_adapter, ModelAdapter};
use crate::commits::CommitPoller;
use crate::config::Config;
use crate::error::{
    IndexError, LoadError, PersistenceError, PollError, ProjectError, QueryError, ValidationError,
};
use crate::filter::RelevanceFilter;
use crate::index::{index_repository, IndexOptions, Indexer};
use crate::loader::{create_loader, GitHubLoader, LoaderKind};
use crate::models::{CommitPollReport, CommitRecord, IndexReport, Project, QueryAnswer, QuestionRecord};
use crate::projects::{create_project, remove_project, resolve_project};
use crate::query::QueryEngine;
use crate::store::{SqliteStore, Store};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub adapter: Arc<dyn ModelAdapter>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::open(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
        adapter: create_adapter(&config.model)?,
    };

    let bind_addr = config.server.bind.clone();
    let app = router(state);

    tracing::info!(%bind_addr, "HTTP server listening");
    println!("repo-rag listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/projects", get(handle_list_projects).post(handle_create_project))
        .route(
            "/projects/{id}",
            get(handle_get_project).delete(handle_delete_project),
        )
        .route("/projects/{id}/index", post(handle_index))
        .route("/projects/{id}/ask", post(handle_ask))
        .route(
            "/projects/{id}/questions",
            get(handle_list_questions).delete(handle_clear_questions),
        )
        .route("/questions/{id}", delete(handle_delete_question))
        .route("/projects/{id}/embeddings", delete(handle_clear_embeddings))
        .route("/projects/{id}/commits/poll", post(handle_poll_commits))
        .route("/projects/{id}/commits", get(handle_list_commits))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::UnknownProject(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            _ => AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
        }
    }
}

impl From<PersistenceError> for AppError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Timeout(_) => {
                AppError::new(StatusCode::REQUEST_TIMEOUT, "timeout", e.to_string())
            }
            PersistenceError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", e.to_string())
            }
            _ => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
        }
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        let (status, code) = match &e {
            LoadError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LoadError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            LoadError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            LoadError::InvalidReference(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            LoadError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };
        AppError::new(status, code, e.to_string())
    }
}

impl From<ProjectError> for AppError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::EmptyName => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.to_string())
            }
            ProjectError::Duplicate(_) => {
                AppError::new(StatusCode::CONFLICT, "conflict", e.to_string())
            }
            ProjectError::InvalidReference(inner) => inner.into(),
            ProjectError::Validation(inner) => inner.into(),
            ProjectError::Persistence(inner) => inner.into(),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Validation(inner) => inner.into(),
        }
    }
}

impl From<IndexError> for AppError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Load(inner) => inner.into(),
            IndexError::Validation(inner) => inner.into(),
            IndexError::Persistence(inner) => inner.into(),
        }
    }
}

impl From<PollError> for AppError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Load(inner) => inner.into(),
            PollError::Persistence(inner) => inner.into(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Bodies are decoded by hand so malformed JSON gets the same error envelope
/// as every other failure, instead of axum's plain-text rejection.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", format!("invalid request body: {e}"))
    })
}

// ============ projects ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    name: String,
    repo_url: String,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDetail {
    #[serde(flatten)]
    project: Project,
    indexed_files: u64,
    embedded_files: u64,
}

async fn handle_list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.store.list_projects().await?))
}

async fn handle_create_project(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let req: CreateProjectRequest = parse_body(&body)?;
    let project = create_project(
        state.store.as_ref(),
        &req.name,
        &req.repo_url,
        req.branch.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn handle_get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    let (indexed_files, embedded_files) = state.store.source_counts(&project.id).await?;
    Ok(Json(ProjectDetail {
        project,
        indexed_files,
        embedded_files,
    }))
}

async fn handle_delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    remove_project(state.store.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /projects/{id}/index ============

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IndexRequest {
    #[serde(default)]
    loader: Option<String>,
    #[serde(default)]
    skip_existing: Option<bool>,
}

async fn handle_index(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<IndexReport>, AppError> {
    let req: IndexRequest = if body.is_empty() {
        IndexRequest::default()
    } else {
        parse_body(&body)?
    };
    let project = resolve_project(state.store.as_ref(), &id).await?;

    let kind = match req.loader.as_deref() {
        None | Some("github") => LoaderKind::Github,
        Some("git") => LoaderKind::Git,
        Some(other) => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("unknown loader '{other}', expected github or git"),
            ))
        }
    };

    let mut options = IndexOptions::from_config(&state.config.indexing);
    if let Some(skip) = req.skip_existing {
        options.skip_existing = skip;
    }
    let filter = RelevanceFilter::from_config(&state.config.indexing).map_err(|e| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    })?;
    let loader = create_loader(kind, &state.config);
    let indexer = Indexer::new(state.store.clone(), state.adapter.clone(), options);
    let token = state.config.github.token();

    let report = index_repository(
        &indexer,
        loader.as_ref(),
        &filter,
        &project,
        token.as_deref(),
    )
    .await?;
    Ok(Json(report))
}

// ============ POST /projects/{id}/ask ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<QueryAnswer>, AppError> {
    let req: AskRequest = parse_body(&body)?;
    let project = resolve_project(state.store.as_ref(), &id).await?;
    let engine = QueryEngine::new(
        state.store.clone(),
        state.adapter.clone(),
        state.config.retrieval.clone(),
        Duration::from_secs(state.config.indexing.call_timeout_secs),
    );
    let answer = engine.ask(&project.id, &req.question, req.top_k).await?;
    Ok(Json(answer))
}

// ============ questions ============

async fn handle_list_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<QuestionRecord>>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    Ok(Json(state.store.list_questions(&project.id).await?))
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: u64,
}

async fn handle_clear_questions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    let deleted = state.store.clear_questions(&project.id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn handle_delete_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_question(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no question with id {id}"),
        ))
    }
}

async fn handle_clear_embeddings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    let deleted = state.store.clear_project(&project.id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

// ============ commits ============

async fn handle_poll_commits(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommitPollReport>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    let source = Arc::new(GitHubLoader::new(&state.config.github.api_url));
    let poller = CommitPoller::new(
        state.store.clone(),
        state.adapter.clone(),
        source,
        state.config.github.commit_limit,
    )
    .with_concurrency(
        state.config.indexing.concurrency,
        Duration::from_secs(state.config.indexing.call_timeout_secs),
    );
    let token = state.config.github.token();
    Ok(Json(poller.poll(&project, token.as_deref()).await?))
}

async fn handle_list_commits(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CommitRecord>>, AppError> {
    let project = resolve_project(state.store.as_ref(), &id).await?;
    Ok(Json(state.store.list_commits(&project.id).await?))
}
