use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use git_serve::ServeError;

#[derive(Debug)]
pub enum GitHttpError {
    NotFound,
    Forbidden,
    BadRequest(String),
    Timeout,
    Internal(String),
}

impl IntoResponse for GitHttpError {
    fn into_response(self) -> Response {
        match self {
            GitHttpError::NotFound => (StatusCode::NOT_FOUND, "repo not found").into_response(),
            GitHttpError::Forbidden => (StatusCode::FORBIDDEN, "forbidden").into_response(),
            GitHttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            GitHttpError::Timeout => {
                (StatusCode::REQUEST_TIMEOUT, "git upload-pack timed out").into_response()
            }
            GitHttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<ServeError> for GitHttpError {
    fn from(err: ServeError) -> Self {
        if err.is_client_error() {
            tracing::debug!("rejecting request: {err}");
            GitHttpError::BadRequest(err.to_string())
        } else {
            tracing::warn!("serve failed: {err}");
            GitHttpError::Internal(err.to_string())
        }
    }
}
