use std::path::PathBuf;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use git_serve::{GixRefStore, ServeContext, ServeError, ServeOptions, serve};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::errors::GitHttpError;
use crate::repo::{is_public_repo, normalize_segments, resolve_repo_dir};
use crate::state::GitHttpState;

const ADVERTISEMENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
const RESULT_TYPE: &str = "application/x-git-upload-pack-result";

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

/// Smart HTTP routes for read-only access.
///
/// Both route shapes share the first parameter name; the router refuses two
/// different names at the same depth.
pub fn router<S: GitHttpState>(state: S) -> Router {
    Router::new()
        .route("/{repo}/info/refs", get(info_refs_root::<S>))
        .route("/{repo}/{nested}/info/refs", get(info_refs_group::<S>))
        .route("/{repo}/git-upload-pack", post(upload_pack_root::<S>))
        .route("/{repo}/{nested}/git-upload-pack", post(upload_pack_group::<S>))
        .route("/{repo}/git-receive-pack", post(receive_pack_blocked))
        .route("/{repo}/{nested}/git-receive-pack", post(receive_pack_blocked))
        .with_state(state)
}

// GET /{repo}(.git)?/info/refs?service=git-upload-pack
pub async fn info_refs_root<S: GitHttpState>(
    State(state): State<S>,
    Path(repo): Path<String>,
    Query(q): Query<ServiceQuery>,
) -> Result<Response, GitHttpError> {
    advertise(state, vec![repo], q, "root").await
}

// GET /{group}/{repo}(.git)?/info/refs?service=git-upload-pack
pub async fn info_refs_group<S: GitHttpState>(
    State(state): State<S>,
    Path((group, repo)): Path<(String, String)>,
    Query(q): Query<ServiceQuery>,
) -> Result<Response, GitHttpError> {
    advertise(state, vec![group, repo], q, "group").await
}

// POST /{repo}(.git)?/git-upload-pack
pub async fn upload_pack_root<S: GitHttpState>(
    State(state): State<S>,
    Path(repo): Path<String>,
    body: Body,
) -> Result<Response, GitHttpError> {
    upload_pack(state, vec![repo], body).await
}

// POST /{group}/{repo}(.git)?/git-upload-pack
pub async fn upload_pack_group<S: GitHttpState>(
    State(state): State<S>,
    Path((group, repo)): Path<(String, String)>,
    body: Body,
) -> Result<Response, GitHttpError> {
    upload_pack(state, vec![group, repo], body).await
}

// POST /.../git-receive-pack (explicitly blocked)
pub async fn receive_pack_blocked() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, "push over HTTP is disabled")
}

async fn advertise<S: GitHttpState>(
    state: S,
    segments: Vec<String>,
    q: ServiceQuery,
    scope: &'static str,
) -> Result<Response, GitHttpError> {
    let start = Instant::now();
    if q.service.as_deref() != Some("git-upload-pack") {
        return Err(GitHttpError::BadRequest("unsupported service".into()));
    }
    let repo_dir = locate_repository(&state, segments)?;

    let options = ServeOptions { advertise_capabilities: true, stateless_rpc: true };
    let body = run_serve(&state, repo_dir, options, Bytes::new()).await?;

    counter!("git_http.info_refs", "scope" => scope).increment(1);
    histogram!("git_http.info_refs_ms").record(start.elapsed().as_millis() as f64);
    Ok(git_response(ADVERTISEMENT_TYPE, body))
}

async fn upload_pack<S: GitHttpState>(
    state: S,
    segments: Vec<String>,
    body: Body,
) -> Result<Response, GitHttpError> {
    let start = Instant::now();
    let repo_dir = locate_repository(&state, segments)?;

    let input = axum::body::to_bytes(body, state.settings().max_body)
        .await
        .map_err(|_| GitHttpError::BadRequest("invalid request body".into()))?;

    let options = ServeOptions { advertise_capabilities: false, stateless_rpc: true };
    let output = run_serve(&state, repo_dir, options, input).await?;

    counter!("git_http.upload_pack").increment(1);
    histogram!("git_http.upload_pack_ms").record(start.elapsed().as_millis() as f64);
    Ok(git_response(RESULT_TYPE, output))
}

fn locate_repository<S: GitHttpState>(
    state: &S,
    segments: Vec<String>,
) -> Result<PathBuf, GitHttpError> {
    let segments =
        normalize_segments(segments).map_err(|e| GitHttpError::BadRequest(e.to_string()))?;
    let repo_dir = resolve_repo_dir(state.storage(), &segments).map_err(|e| {
        tracing::debug!("resolve_repo_dir failed: {e}");
        GitHttpError::NotFound
    })?;
    // Unexported repositories look exactly like missing ones.
    if !is_public_repo(&repo_dir, state.settings().export_all) {
        tracing::debug!("repo not exported: {}", repo_dir.display());
        return Err(GitHttpError::NotFound);
    }
    Ok(repo_dir)
}

/// Runs the serve loop against `repo_dir` on a blocking thread.
async fn run_serve<S: GitHttpState>(
    state: &S,
    repo_dir: PathBuf,
    options: ServeOptions,
    input: Bytes,
) -> Result<Vec<u8>, GitHttpError> {
    let registry = state.registry().clone();
    let agent = state.settings().agent.clone();
    let namespace = state.settings().namespace.clone();
    run_blocking(state, move || {
        let store = GixRefStore::open(&repo_dir, namespace.as_deref())?;
        let ctx = ServeContext::new(&store).with_agent(agent);
        let mut output = Vec::with_capacity(1024);
        serve(&ctx, &registry, options, &input[..], &mut output)?;
        Ok(output)
    })
    .await
}

/// Runs `job` on a blocking thread under a semaphore permit and the request
/// timeout. The permit moves into the job, so work abandoned by a timeout
/// still counts against `max_concurrency` until it finishes.
async fn run_blocking<S, T, F>(state: &S, job: F) -> Result<T, GitHttpError>
where
    S: GitHttpState,
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServeError> + Send + 'static,
{
    let permit = state
        .git_semaphore()
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| GitHttpError::Internal(e.to_string()))?;

    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        job()
    });

    let timeout = Duration::from_millis(state.settings().timeout_ms);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(join)) => Err(GitHttpError::Internal(join.to_string())),
        Err(_) => {
            tracing::warn!(timeout_ms = state.settings().timeout_ms, "serve timed out");
            Err(GitHttpError::Timeout)
        }
    }
}

fn git_response(content_type: &'static str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, "no-cache")],
        body,
    )
        .into_response()
}
