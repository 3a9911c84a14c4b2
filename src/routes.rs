//! Route definitions.
//!
//! ## Routes
//!
//! - `GET /favicon.ico` - always 404
//! - `GET /{illust id}[-{page}].{jpg|jpeg|png|gif}` - relayed image
//!
//! Anything else is a bad request.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::error::RelayError;
use crate::page::{derive_image_url, validate_page};
use crate::path::ImageRequest;
use crate::state::AppState;

/// Build the complete relay router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/{file}", get(serve_image))
        .fallback(unrecognized)
        .with_state(state)
}

async fn favicon() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
    )
}

async fn unrecognized(uri: Uri) -> RelayError {
    tracing::debug!(path = %uri.path(), "unrecognized path");
    RelayError::BadRequest(uri.path().to_string())
}

/// Handle an image request.
///
/// Runs the pipeline in order, stopping at the first failure:
/// 1. Parse the path into an [`ImageRequest`]
/// 2. Fetch illustration metadata
/// 3. Check the page selector against the page count
/// 4. Derive the per-page image URL
/// 5. Relay the image
pub async fn serve_image(State(state): State<AppState>, uri: Uri) -> Result<Response, RelayError> {
    let Some(request) = ImageRequest::parse(uri.path()) else {
        tracing::debug!(path = %uri.path(), "not an image path");
        return Err(RelayError::BadRequest(uri.path().to_string()));
    };

    relay_image(&state, &request).await
}

/// Resolves and relays one parsed request.
pub async fn relay_image(state: &AppState, request: &ImageRequest) -> Result<Response, RelayError> {
    let metadata = state
        .metadata
        .fetch(&request.illust_id)
        .await
        .map_err(|e| failed(request, "metadata", e))?;

    let page = validate_page(metadata.page_count, request.page)
        .map_err(|e| failed(request, "validate", e))?;

    let url = derive_image_url(&metadata.regular_url, &request.illust_id, page)
        .map_err(|e| failed(request, "derive", e))?;

    tracing::debug!(
        illust_id = %request.illust_id,
        page,
        page_count = metadata.page_count,
        url = %url,
        "resolved image"
    );

    state
        .relay
        .relay(request, &url)
        .await
        .map_err(|e| failed(request, "relay", e))
}

/// Logs a failed stage with its request context.
fn failed(request: &ImageRequest, stage: &'static str, err: impl Into<RelayError>) -> RelayError {
    let err = err.into();
    if err.is_client_error() {
        tracing::debug!(
            illust_id = %request.illust_id,
            page = ?request.page,
            stage,
            status = err.status().as_u16(),
            error = %err,
            "request rejected"
        );
    } else {
        tracing::warn!(
            illust_id = %request.illust_id,
            page = ?request.page,
            stage,
            status = err.status().as_u16(),
            error = %err,
            "request failed"
        );
    }
    err
}
