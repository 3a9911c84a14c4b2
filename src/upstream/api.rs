//! Metadata from the JSON endpoint at `/ajax/illust/<id>`.

use super::{IllustBody, IllustrationMetadata, MetadataSource};
use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// API response wrapper.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    body: JsonValue,
}

/// Metadata source backed by the upstream JSON API.
pub struct ApiSource {
    client: reqwest::Client,
    headers: HeaderMap,
    origin: String,
    language: String,
}

impl ApiSource {
    /// Creates a new API source. `headers` is the metadata template; the
    /// source narrows its `Accept` to JSON once, here.
    pub fn new(client: reqwest::Client, headers: HeaderMap, origin: &str, language: &str) -> Self {
        let mut headers = headers;
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        Self {
            client,
            headers,
            origin: origin.trim_end_matches('/').to_string(),
            language: language.to_string(),
        }
    }

    fn endpoint(&self, illust_id: &str) -> String {
        format!(
            "{}/ajax/illust/{}?lang={}",
            self.origin, illust_id, self.language
        )
    }
}

/// Interprets the body of a successful API response.
fn parse_api_response(
    illust_id: &str,
    bytes: &[u8],
) -> Result<IllustrationMetadata, UpstreamError> {
    let response: ApiResponse = serde_json::from_slice(bytes).map_err(|e| {
        UpstreamError::Malformed(format!("Failed to parse API response: {}", e))
    })?;

    if response.error {
        return Err(UpstreamError::NotFound(format!(
            "API error for {}: {}",
            illust_id,
            response.message.unwrap_or_default()
        )));
    }

    // Upstream answers unknown works with `"body": []`.
    let empty = match &response.body {
        JsonValue::Null => true,
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(UpstreamError::NotFound(format!(
            "API response for {} has no body",
            illust_id
        )));
    }

    IllustBody::decode(illust_id, response.body)
}

#[async_trait]
impl MetadataSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, illust_id: &str) -> Result<IllustrationMetadata, UpstreamError> {
        let url = self.endpoint(illust_id);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "non-success API response");
            return Err(UpstreamError::NotFound(format!(
                "API returned HTTP {} for {}",
                status, illust_id
            )));
        }

        let bytes = response.bytes().await?;
        parse_api_response(illust_id, &bytes)
    }
}
