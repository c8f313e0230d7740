use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReleaseProxyError>;

#[derive(Error, Debug)]
pub enum ReleaseProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status} for {url}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Failed to decode upstream manifest: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Malformed manifest entry: {0}")]
    MalformedEntry(String),
}

impl ReleaseProxyError {
    /// Response status for this error. Upstream and upstream-data failures are
    /// the upstream's fault; everything else is ours.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReleaseProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ReleaseProxyError::Http(_)
            | ReleaseProxyError::UpstreamStatus { .. }
            | ReleaseProxyError::Decode(_)
            | ReleaseProxyError::MalformedEntry(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ReleaseProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(
            status = %status,
            error = %self,
            "Request failed"
        );
        (status, self.to_string()).into_response()
    }
}
