//! Error types for rendering, export and smart links
//!
//! Every error is local to the operation that raised it. The HTTP layer turns
//! them into a JSON body of the form `{"error": "...", "code": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of the external module-matrix encoder
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EncodeError(pub String);

/// A background or logo image could not be fetched or decoded
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to load asset {asset}: {reason}")]
    LoadFailed { asset: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// A newer render request was issued while this one was suspended
    #[error("render superseded by a newer request")]
    Superseded,
}

impl From<EncodeError> for RenderError {
    fn from(err: EncodeError) -> Self {
        RenderError::EncodingFailed(err.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] redb::Error),

    #[error("malformed record for `{key}`: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("key `{0}` already exists")]
    Conflict(String),
}

impl StoreError {
    /// Wraps any of redb's per-operation errors.
    pub fn backend(err: impl Into<redb::Error>) -> Self {
        StoreError::Backend(err.into())
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("short code `{0}` is already taken")]
    CodeTaken(String),

    #[error("could not find a free short code")]
    CodeSpaceExhausted,

    #[error("smart link not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("spec serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("page rendering failed: {0}")]
    Page(#[from] askama::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Render(RenderError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Render(RenderError::EncodingFailed(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "encoding_failed")
            }
            ApiError::Render(RenderError::Superseded) => (StatusCode::CONFLICT, "superseded"),
            ApiError::Link(LinkError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Link(LinkError::CodeTaken(_)) => (StatusCode::CONFLICT, "code_taken"),
            ApiError::Link(LinkError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Link(LinkError::CodeSpaceExhausted) | ApiError::Link(LinkError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
            ApiError::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "export_failed"),
            ApiError::Page(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string(), "code": code }))).into_response()
    }
}
