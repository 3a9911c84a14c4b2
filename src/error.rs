//! Error types for the relay.
//!
//! Uses `thiserror` for structured error definitions. Every failure a request
//! can hit ends up as a [`RelayError`], and [`RelayError::status`] is the one
//! place that decides which HTTP status the client sees.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// The shared upstream client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Failures talking to the upstream site.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Upstream does not know the illustration
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure (DNS, connect, TLS, timeout, body read)
    #[error("Upstream unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// Upstream answered, but not in the shape we expect
    #[error("Malformed upstream payload: {0}")]
    Malformed(String),
}

/// A page selector that does not fit the illustration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("page {requested} does not exist (illustration has {page_count})")]
    OutOfRange { requested: u32, page_count: u32 },

    #[error("illustration has a single page, page selector not applicable")]
    SelectorNotApplicable,

    #[error("illustration has {page_count} pages, page selector required")]
    SelectorRequired { page_count: u32 },
}

/// Top-level error for a single relayed request.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The request path is not an image path
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The image fetch failed after metadata resolved
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Maps the failure to the status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Page(PageError::OutOfRange { .. }) => StatusCode::NOT_FOUND,
            Self::Page(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for failures caused by the client's request rather than upstream.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        // No detail leaks to the client; the handler has already logged it.
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        )
            .into_response()
    }
}
