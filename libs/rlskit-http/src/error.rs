use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use rlskit_security::ResolveError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RlsHttpError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("RLS context not found - rls_context_middleware not configured")]
    MissingContext,
}

impl RlsHttpError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Resolve(ResolveError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            Self::Resolve(_) | Self::MissingContext => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RlsHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "RLS context resolution failed");
        } else {
            tracing::debug!(error = %self, "request rejected by RLS resolver");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
