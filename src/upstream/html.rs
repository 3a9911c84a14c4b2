//! Metadata scraped from the artwork page.
//!
//! The page embeds every object the front end needs as a JSON document in the
//! `content` attribute of `<meta id="meta-preload-data">`, with illustrations
//! keyed by id under `illust`.

use super::{IllustBody, IllustrationMetadata, MetadataSource};
use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// CSS selectors used for parsing.
struct Selectors {
    /// Meta element carrying the preload document.
    preload_data: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            preload_data: Selector::parse(r#"meta[id="meta-preload-data"]"#).unwrap(),
        }
    }
}

/// Preload document embedded in the artwork page.
#[derive(Debug, Deserialize)]
struct PreloadData {
    #[serde(default)]
    illust: HashMap<String, JsonValue>,
}

/// Metadata source backed by the artwork HTML page.
pub struct HtmlSource {
    client: reqwest::Client,
    headers: HeaderMap,
    origin: String,
    language: String,
    selectors: Selectors,
}

impl HtmlSource {
    /// Creates a new HTML source using the metadata header template.
    pub fn new(client: reqwest::Client, headers: HeaderMap, origin: &str, language: &str) -> Self {
        Self {
            client,
            headers,
            origin: origin.trim_end_matches('/').to_string(),
            language: language.to_string(),
            selectors: Selectors::new(),
        }
    }

    fn page_url(&self, illust_id: &str) -> String {
        format!("{}/{}/artworks/{}", self.origin, self.language, illust_id)
    }

    /// Extracts the illustration object from the artwork page markup.
    fn extract(&self, illust_id: &str, markup: &str) -> Result<IllustrationMetadata, UpstreamError> {
        let document = Html::parse_document(markup);

        let content = document
            .select(&self.selectors.preload_data)
            .next()
            .and_then(|elem| elem.value().attr("content"))
            .ok_or_else(|| {
                UpstreamError::Malformed(format!(
                    "artwork page for {} has no preload data",
                    illust_id
                ))
            })?;

        let mut data: PreloadData = serde_json::from_str(content).map_err(|e| {
            UpstreamError::Malformed(format!("Failed to parse preload data: {}", e))
        })?;

        let illust = data.illust.remove(illust_id).ok_or_else(|| {
            UpstreamError::Malformed(format!("preload data does not describe {}", illust_id))
        })?;

        IllustBody::decode(illust_id, illust)
    }
}

#[async_trait]
impl MetadataSource for HtmlSource {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn fetch(&self, illust_id: &str) -> Result<IllustrationMetadata, UpstreamError> {
        let url = self.page_url(illust_id);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = status.as_u16(), "non-success artwork page");
            return Err(UpstreamError::NotFound(format!(
                "artwork page returned HTTP {} for {}",
                status, illust_id
            )));
        }

        // gzip/brotli bodies are decoded by the client.
        let markup = response.text().await?;
        self.extract(illust_id, &markup)
    }
}
