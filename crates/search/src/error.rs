//! Error types for the search engine.

use thiserror::Error;

/// Errors produced by the search engine.
///
/// Domain and windowing problems are never errors: an unusable temporal
/// extent is reported as [`SliderDomain::has_valid_range`](crate::window::SliderDomain)
/// and a failed session as [`SearchStatus::Errored`](crate::session::SearchStatus).
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not {method} {url}: {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid bbox: expected 4 or 6 values, got {len}")]
    InvalidBbox { len: usize },

    #[error("invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    #[error("no search link found for {id}")]
    NoSearchLink { id: String },
}

/// Result alias for search engine operations.
pub type Result<T> = std::result::Result<T, SearchError>;
