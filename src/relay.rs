//! Image relay.
//!
//! Fetches the resolved image URL with the image header template and streams
//! the body straight back to the client, optionally teeing it into the
//! [`ImageStore`]. Bytes pass through unmodified and uninspected.

use crate::error::{RelayError, UpstreamError};
use crate::path::ImageRequest;
use crate::store::{ImageStore, PendingImage};
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use std::io;

/// Cache directive for relayed images: one year, shareable.
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// Streams upstream images to clients.
pub struct ImageRelay {
    client: reqwest::Client,
    headers: HeaderMap,
    store: Option<ImageStore>,
}

impl ImageRelay {
    /// Creates a relay using the image header template. Images are persisted
    /// only when `store` is given.
    pub fn new(client: reqwest::Client, headers: HeaderMap, store: Option<ImageStore>) -> Self {
        Self {
            client,
            headers,
            store,
        }
    }

    pub fn store(&self) -> Option<&ImageStore> {
        self.store.as_ref()
    }

    /// Fetches `url` and turns it into the client response for `request`.
    pub async fn relay(&self, request: &ImageRequest, url: &str) -> Result<Response, RelayError> {
        let upstream = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(UpstreamError::from)?;

        let status = upstream.status();
        if !status.is_success() {
            return Err(RelayError::Internal(format!(
                "image fetch returned HTTP {} for {}",
                status, url
            )));
        }

        let mut headers = HeaderMap::new();
        for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH] {
            if let Some(value) = upstream.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }
        headers.insert(header::AGE, HeaderValue::from_static("0"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));

        let pending = match &self.store {
            Some(store) => store.begin(request).await,
            None => None,
        };

        let body = Body::from_stream(tee(upstream.bytes_stream(), pending));
        Ok((StatusCode::OK, headers, body).into_response())
    }
}

/// Passes `upstream` through while copying every chunk to `pending`.
///
/// The copy is only committed when `upstream` ends cleanly. An upstream error,
/// or the client going away before the end, abandons it.
fn tee<S, E>(
    upstream: S,
    pending: Option<PendingImage>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    futures::stream::unfold(
        (Box::pin(upstream), pending),
        |(mut upstream, mut pending)| async move {
            match upstream.next().await {
                Some(Ok(bytes)) => {
                    if let Some(pending) = &pending {
                        pending.push(bytes.clone());
                    }
                    Some((Ok(bytes), (upstream, pending)))
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "image stream failed mid-body");
                    drop(pending.take());
                    Some((Err(io::Error::other(e)), (upstream, pending)))
                }
                None => {
                    if let Some(pending) = pending.take() {
                        pending.finish();
                    }
                    None
                }
            }
        },
    )
}
