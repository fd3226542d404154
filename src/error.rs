//! Error types shared by the store, the replayer and the dispatcher.

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`FixtureStore`](crate::store::FixtureStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key vanished between `exists` and `read`.
    #[error("fixture not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to check fixture {}: {source}", .path.display())]
    Exists {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read fixture {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write fixture {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A stored fixture that cannot be replayed.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("malformed fixture: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed fixture: invalid status code {0}")]
    InvalidStatus(u16),

    #[error("malformed fixture: invalid content type {0:?}")]
    InvalidContentType(String),
}

/// Failure of a single request inside the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to capture request body: {0}")]
    BodyCapture(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("storage failure for {}: {source}", .key.display())]
    Storage {
        key: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("cannot replay {}: {source}", .key.display())]
    Malformed {
        key: PathBuf,
        #[source]
        source: FixtureError,
    },
}

impl DispatchError {
    /// Status code the client sees for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::BodyCapture(_) => StatusCode::BAD_REQUEST,
            DispatchError::Storage { .. } | DispatchError::Malformed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render the failure as a plain-text response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.to_string())));
        *response.status_mut() = self.status();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("text/plain"),
        );
        response
    }
}
