//! Upstream metadata retrieval.
//!
//! This module defines the interface both metadata strategies implement,
//! the header templates shared by every upstream request, and the typed
//! metadata structure the rest of the relay works with.

mod api;
mod html;

pub use api::ApiSource;
pub use html::HtmlSource;

use crate::config::{Config, MetadataStrategy};
use crate::error::{ConfigError, UpstreamError};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// What the relay needs to know about an illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllustrationMetadata {
    /// Number of pages, at least 1.
    pub page_count: u32,

    /// Image URL of the first page, containing the `_p0` marker.
    pub regular_url: String,
}

/// Per-illustration object as upstream sends it.
///
/// Every field is optional so a missing one is reported as malformed
/// instead of failing deserialization with an opaque message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IllustBody {
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    urls: Option<IllustUrls>,
}

#[derive(Debug, Deserialize)]
struct IllustUrls {
    #[serde(default)]
    regular: Option<String>,
}

impl IllustBody {
    /// Decodes an illustration object, failing closed on missing fields.
    fn decode(
        illust_id: &str,
        value: serde_json::Value,
    ) -> Result<IllustrationMetadata, UpstreamError> {
        let body: IllustBody = serde_json::from_value(value).map_err(|e| {
            UpstreamError::Malformed(format!("illustration {}: {}", illust_id, e))
        })?;

        let page_count = body.page_count.filter(|&n| n >= 1).ok_or_else(|| {
            UpstreamError::Malformed(format!("illustration {}: missing pageCount", illust_id))
        })?;

        let regular_url = body
            .urls
            .and_then(|urls| urls.regular)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                UpstreamError::Malformed(format!(
                    "illustration {}: missing urls.regular",
                    illust_id
                ))
            })?;

        Ok(IllustrationMetadata {
            page_count,
            regular_url,
        })
    }
}

/// Trait for illustration metadata providers.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Returns the identifier used in logs.
    fn name(&self) -> &'static str;

    /// Fetches metadata for one illustration.
    async fn fetch(&self, illust_id: &str) -> Result<IllustrationMetadata, UpstreamError>;
}

/// Tries `primary` first and consults `secondary` when `primary` could not
/// give an answer. A not-found from `primary` is final.
pub struct FallbackSource {
    primary: Arc<dyn MetadataSource>,
    secondary: Arc<dyn MetadataSource>,
}

impl FallbackSource {
    pub fn new(primary: Arc<dyn MetadataSource>, secondary: Arc<dyn MetadataSource>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl MetadataSource for FallbackSource {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn fetch(&self, illust_id: &str) -> Result<IllustrationMetadata, UpstreamError> {
        match self.primary.fetch(illust_id).await {
            Err(UpstreamError::NotFound(reason)) => Err(UpstreamError::NotFound(reason)),
            Err(err) => {
                tracing::warn!(
                    illust_id,
                    source = self.primary.name(),
                    fallback = self.secondary.name(),
                    error = %err,
                    "metadata source failed, falling back"
                );
                self.secondary.fetch(illust_id).await
            }
            ok => ok,
        }
    }
}

/// Header templates built once from configuration.
#[derive(Debug, Clone)]
pub struct UpstreamHeaders {
    /// Sent with API and artwork page requests.
    pub metadata: HeaderMap,

    /// Sent with image requests. Never carries the session cookie.
    pub image: HeaderMap,
}

impl UpstreamHeaders {
    /// Builds both header templates from configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let user_agent = header_value("user_agent", &config.user_agent)?;
        let referer = header_value("upstream.referer", &config.upstream.referer)?;
        let language = header_value(
            "upstream.language",
            &format!("{},en-US;q=0.9,en;q=0.8", config.upstream.language),
        )?;

        let mut metadata = HeaderMap::new();
        metadata.insert(header::USER_AGENT, user_agent.clone());
        metadata.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        metadata.insert(header::ACCEPT_LANGUAGE, language);
        metadata.insert(header::REFERER, referer.clone());
        if let Some(cookie) = config.session_cookie() {
            let mut cookie = header_value("cookie", cookie)?;
            cookie.set_sensitive(true);
            metadata.insert(header::COOKIE, cookie);
        }

        let mut image = HeaderMap::new();
        image.insert(header::USER_AGENT, user_agent);
        image.insert(
            header::ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        image.insert("sec-fetch-dest", HeaderValue::from_static("image"));
        image.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        image.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
        image.insert(header::REFERER, referer);

        Ok(Self { metadata, image })
    }
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Creates the HTTP client shared by every upstream request.
pub fn create_http_client(config: &Config) -> Result<reqwest::Client, ConfigError> {
    let timeout = Duration::from_secs(config.upstream.timeout_secs);

    let client = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?;

    Ok(client)
}

/// Builds the metadata source selected by configuration.
pub fn build_source(
    config: &Config,
    client: reqwest::Client,
    headers: &UpstreamHeaders,
) -> Arc<dyn MetadataSource> {
    let api = || -> Arc<dyn MetadataSource> {
        Arc::new(ApiSource::new(
            client.clone(),
            headers.metadata.clone(),
            config.upstream_origin(),
            &config.upstream.language,
        ))
    };
    let html = || -> Arc<dyn MetadataSource> {
        Arc::new(HtmlSource::new(
            client.clone(),
            headers.metadata.clone(),
            config.upstream_origin(),
            &config.upstream.language,
        ))
    };

    match config.upstream.strategy {
        MetadataStrategy::Api => api(),
        MetadataStrategy::Html => html(),
        MetadataStrategy::ApiThenHtml => Arc::new(FallbackSource::new(api(), html())),
    }
}
